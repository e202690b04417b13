use crate::consts::{BlockPointer, MAX_NAME_LENGTH};
use crate::util::error::{FsError, Result};

/// Name to inode table. Entry `i` of `names` and entry `i` of `numbers`
/// always describe the same file.
#[derive(Debug, PartialEq, Default, Clone)]
pub struct Directory {
    names: Vec<String>,
    numbers: Vec<BlockPointer>,
}

impl Directory {
    pub fn new() -> Directory {
        Directory::default()
    }

    /// Rebuilds the table from the payloads of the name and number inodes.
    pub fn from_bytes(name_bytes: &[u8], number_bytes: &[u8]) -> Result<Directory> {
        let names = Directory::decode_names(name_bytes)?;
        let numbers = number_bytes.to_vec();

        if names.len() != numbers.len() {
            return Err(FsError::DirAlignment { names: names.len(), numbers: numbers.len() });
        }

        for (index, name) in names.iter().enumerate() {
            if names[..index].contains(name) {
                return Err(FsError::Format(format!("directory lists {:?} twice", name)));
            }
            if numbers[..index].contains(&numbers[index]) {
                return Err(FsError::Format(format!("inode {} is listed twice", numbers[index])));
            }
        }

        Ok(Directory { names, numbers })
    }

    pub fn names_to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for name in &self.names {
            bytes.push(name.len() as u8);
            bytes.extend_from_slice(name.as_bytes());
        }
        bytes
    }

    pub fn numbers_to_bytes(&self) -> Vec<u8> {
        self.numbers.clone()
    }

    fn decode_names(bytes: &[u8]) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut data = bytes;
        while let Some((length, remainder)) = data.split_first() {
            let length = *length as usize;
            if length > remainder.len() {
                return Err(FsError::format("directory name runs past the end of its inode"));
            }
            let (name_bytes, remainder) = remainder.split_at(length);
            let name = String::from_utf8(name_bytes.to_vec())
                .map_err(|_| FsError::format("directory name is not valid utf-8"))?;
            names.push(name);
            data = remainder;
        }
        Ok(names)
    }

    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > MAX_NAME_LENGTH || name.contains('/') || name.contains('\0') {
            return Err(FsError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    pub fn insert(&mut self, name: &str, inode: BlockPointer) -> Result<()> {
        Directory::validate_name(name)?;
        if self.lookup(name).is_some() {
            return Err(FsError::DuplicateName(name.to_string()));
        }

        self.names.push(name.to_string());
        self.numbers.push(inode);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<BlockPointer> {
        let index = self.position(name).ok_or_else(|| FsError::NotFound(name.to_string()))?;
        self.names.remove(index);
        Ok(self.numbers.remove(index))
    }

    pub fn lookup(&self, name: &str) -> Option<BlockPointer> {
        self.position(name).map(|index| self.numbers[index])
    }

    pub fn name_of(&self, inode: BlockPointer) -> Option<&str> {
        self.numbers
            .iter()
            .position(|number| *number == inode)
            .map(|index| self.names[index].as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, BlockPointer)> {
        self.names.iter().map(String::as_str).zip(self.numbers.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|entry| entry == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_aligned(directory: &Directory) {
        assert_eq!(directory.names.len(), directory.numbers.len());
        for (name, number) in directory.entries() {
            assert_eq!(directory.lookup(name), Some(number));
            assert_eq!(directory.name_of(number), Some(name));
        }
    }

    #[test]
    fn insert_and_lookup() {
        let mut directory = Directory::new();
        directory.insert("file1", 39).unwrap();
        directory.insert("file2", 38).unwrap();
        assert_eq!(directory.lookup("file1"), Some(39));
        assert_eq!(directory.lookup("file3"), None);
        assert_eq!(directory.len(), 2);
        assert!(matches!(directory.insert("file1", 10), Err(FsError::DuplicateName(_))));
    }

    #[test]
    fn names_are_validated() {
        let mut directory = Directory::new();
        assert!(matches!(directory.insert("", 1), Err(FsError::InvalidName(_))));
        assert!(matches!(directory.insert("a/b", 1), Err(FsError::InvalidName(_))));
        assert!(matches!(directory.insert(&"x".repeat(MAX_NAME_LENGTH + 1), 1), Err(FsError::InvalidName(_))));
        directory.insert(&"x".repeat(MAX_NAME_LENGTH), 1).unwrap();
    }

    #[test]
    fn remove_keeps_alignment_in_any_order() {
        let mut directory = Directory::new();
        for (i, name) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            directory.insert(name, 30 + i as u8).unwrap();
        }
        assert_eq!(directory.remove("c").unwrap(), 32);
        assert_aligned(&directory);
        assert_eq!(directory.remove("a").unwrap(), 30);
        directory.insert("f", 32).unwrap();
        assert_eq!(directory.remove("e").unwrap(), 34);
        assert_aligned(&directory);
        assert!(matches!(directory.remove("e"), Err(FsError::NotFound(_))));
        let names: Vec<&str> = directory.entries().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "d", "f"]);
    }

    #[test]
    fn encoding() {
        let mut directory = Directory::new();
        directory.insert("ab", 39).unwrap();
        directory.insert("c", 38).unwrap();
        assert_eq!(directory.names_to_bytes(), vec![2, b'a', b'b', 1, b'c']);
        assert_eq!(directory.numbers_to_bytes(), vec![39, 38]);

        let decoded = Directory::from_bytes(&directory.names_to_bytes(), &directory.numbers_to_bytes()).unwrap();
        assert_eq!(decoded, directory);
    }

    #[test]
    fn misaligned_sequences() {
        let result = Directory::from_bytes(&[1, b'a', 1, b'b'], &[39]);
        assert!(matches!(result, Err(FsError::DirAlignment { names: 2, numbers: 1 })));
    }

    #[test]
    fn truncated_names() {
        assert!(matches!(Directory::from_bytes(&[5, b'a'], &[39]), Err(FsError::Format(_))));
    }

    #[test]
    fn duplicates_on_disk_are_rejected() {
        let names = [1, b'a', 1, b'a'];
        assert!(matches!(Directory::from_bytes(&names, &[39, 38]), Err(FsError::Format(_))));
        let names = [1, b'a', 1, b'b'];
        assert!(matches!(Directory::from_bytes(&names, &[39, 39]), Err(FsError::Format(_))));
        assert_eq!(Directory::from_bytes(&names, &[39, 38]).unwrap().len(), 2);
    }
}
