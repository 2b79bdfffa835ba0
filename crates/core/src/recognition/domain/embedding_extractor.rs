use crate::shared::frame::Frame;

/// Result of running the embedding model over a face crop.
#[derive(Clone, Debug, PartialEq)]
pub enum Extraction {
    /// Raw model output; callers normalize before matching.
    Embedding(Vec<f32>),
    /// No face could be located in the crop, even after padding.
    NoFaceFound,
}

/// Domain interface for turning a face crop into an embedding vector.
///
/// Shared by every recognition worker, hence `&self` and `Sync`;
/// implementations guard their inference sessions internally.
pub trait EmbeddingExtractor: Send + Sync {
    fn extract(&self, face: &Frame) -> Result<Extraction, Box<dyn std::error::Error>>;
}
