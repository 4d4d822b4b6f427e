mod gemini;

pub use gemini::{GeminiEmbedding, API_KEY_ENV};
