mod embedder;
mod pooler;
mod projection;
mod session;

pub use embedder::Embedder;
pub use pooler::mean_pool;
pub use projection::Projection;
pub use session::InferenceSession;
