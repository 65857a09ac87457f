pub mod db;
pub mod hash;

pub use db::{
    create_db, delete_file, get_file, insert_file, list_files, DbPool, FileKind, FileMeta,
    InsertOutcome, StoredFile,
};
pub use hash::sha256_hex;
