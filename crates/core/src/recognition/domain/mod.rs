pub mod embedding;
pub mod embedding_extractor;
pub mod identity_database;
pub mod matcher;
pub mod recognizer;
