use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;

use tinyfs::consts::DEFAULT_VOLUME_SIZE;
use tinyfs::util::format::pretty_size_from_bytes;
use tinyfs::{FsError, Result, TinyFs};

#[derive(Parser)]
#[command(name = "tinyfs", version, about = "Work with tinyfs disk images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a fresh volume, overwriting the image
    Format {
        image: PathBuf,
        #[arg(short, long, default_value_t = DEFAULT_VOLUME_SIZE)]
        size: u64,
    },
    /// List the files on the volume
    Ls { image: PathBuf },
    /// Show volume usage
    Info { image: PathBuf },
    /// Copy a host file onto the volume
    Put { image: PathBuf, name: String, source: PathBuf },
    /// Print a file to stdout
    Cat {
        image: PathBuf,
        name: String,
        #[arg(short, long, default_value_t = 0)]
        offset: i64,
    },
    /// Delete a file
    Rm { image: PathBuf, name: String },
    /// Serve the volume through FUSE
    Mount { image: PathBuf, mountpoint: PathBuf },
}

fn mounted(image: &Path) -> Result<TinyFs> {
    let mut fs: TinyFs = TinyFs::new();
    fs.mount(image)?;
    Ok(fs)
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Format { image, size } => {
            let mut fs: TinyFs = TinyFs::new();
            fs.format(&image, size)?;
            println!("formatted {} ({})", image.display(), pretty_size_from_bytes(size));
            Ok(())
        }
        Command::Ls { image } => {
            let mut fs = mounted(&image)?;
            for stat in fs.list()? {
                println!("{:>4} {:>10} {}", stat.inode, pretty_size_from_bytes(stat.size), stat.name);
            }
            fs.unmount()
        }
        Command::Info { image } => {
            let mut fs = mounted(&image)?;
            let usage = fs.usage()?;
            println!("blocks: {} used / {} total", usage.used_blocks, usage.block_count);
            println!("size:   {}", pretty_size_from_bytes(usage.total_bytes()));
            println!("free:   {}", pretty_size_from_bytes(usage.free_bytes()));
            println!("files:  {}", usage.files);
            fs.unmount()
        }
        Command::Put { image, name, source } => {
            let data = fs::read(&source)?;

            let mut fs = mounted(&image)?;
            let descriptor = fs.open(&name)?;
            fs.write(descriptor, &data)?;
            fs.close(descriptor)?;
            fs.unmount()
        }
        Command::Cat { image, name, offset } => {
            let mut fs = mounted(&image)?;
            fs.stat(&name)?;
            let descriptor = fs.open(&name)?;
            fs.seek(descriptor, offset)?;

            let mut stdout = io::stdout().lock();
            loop {
                match fs.read_byte(descriptor) {
                    Ok(byte) => stdout.write_all(&[byte])?,
                    Err(FsError::EndOfFile) => break,
                    Err(error) => return Err(error),
                }
            }
            stdout.flush()?;
            fs.close(descriptor)?;
            fs.unmount()
        }
        Command::Rm { image, name } => {
            let mut fs = mounted(&image)?;
            fs.stat(&name)?;
            let descriptor = fs.open(&name)?;
            fs.delete(descriptor)?;
            fs.unmount()
        }
        // the adapter unmounts the session when the kernel lets go
        Command::Mount { image, mountpoint } => Ok(tinyfs::fuse::mount(mounted(&image)?, mountpoint)?),
    }
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{}", error);
            eprintln!("tinyfs: {}", error);
            ExitCode::FAILURE
        }
    }
}
