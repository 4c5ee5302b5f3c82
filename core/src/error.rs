use thiserror::Error;

/// Every failure category a `Filesystem` operation can report. No operation
/// panics on a reported error; partial progress is forbidden (section 7).
#[derive(Error, Debug)]
pub enum FsError {
    #[error("no such path: {0}")]
    NoSuchPath(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("name too long: {0}")]
    NameTooLong(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("descriptor table full")]
    DescriptorTableFull,

    #[error("hard-link table full")]
    HardlinkTableFull,

    #[error("no free blocks")]
    NoFreeBlocks,

    #[error("maximum file size reached")]
    MaxFileSize,

    #[error("wrong offset")]
    BadOffset,

    #[error("bad file handle: {0}")]
    BadHandle(usize),

    #[error("not a regular file: {0}")]
    NotARegularFile(String),

    #[error("symlink loop")]
    SymlinkLoop,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
