pub mod gemini;

pub use gemini::{GeminiTransport, API_KEY_ENV, DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_URL};
