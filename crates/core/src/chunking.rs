use crate::config::PipelineOptions;

pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

pub trait TokenMeasure {
    fn measure(&self, text: &str) -> usize;
}

impl<F> TokenMeasure for F
where
    F: Fn(&str) -> usize,
{
    fn measure(&self, text: &str) -> usize {
        self(text)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CharHeuristic {
    pub chars_per_token: usize,
}

impl Default for CharHeuristic {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

impl TokenMeasure for CharHeuristic {
    fn measure(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token.max(1))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub chars_per_token: usize,
}

impl From<&PipelineOptions> for ChunkingConfig {
    fn from(value: &PipelineOptions) -> Self {
        Self {
            max_tokens: value.max_chunk_tokens,
            chars_per_token: value.chars_per_token,
        }
    }
}

impl ChunkingConfig {
    pub fn heuristic(&self) -> CharHeuristic {
        CharHeuristic {
            chars_per_token: self.chars_per_token,
        }
    }
}

/// Packs paragraphs into chunks whose measured size stays within `max_tokens`.
///
/// Paragraph boundaries are the only split points, so a paragraph larger than
/// the budget becomes its own chunk. Joining the chunks with
/// [`PARAGRAPH_SEPARATOR`] reproduces `text` exactly. A separator run that fits
/// on neither side of a boundary is emitted as a whitespace-only chunk.
pub fn chunk_by_paragraph<M>(text: &str, max_tokens: usize, measure: &M) -> Vec<String>
where
    M: TokenMeasure + ?Sized,
{
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut paragraphs = text.split(PARAGRAPH_SEPARATOR);
    let mut buffer = paragraphs.next().unwrap_or_default().to_string();
    let mut chunks: Vec<String> = Vec::new();

    for paragraph in paragraphs {
        let mut joined =
            String::with_capacity(buffer.len() + PARAGRAPH_SEPARATOR.len() + paragraph.len());
        joined.push_str(&buffer);
        joined.push_str(PARAGRAPH_SEPARATOR);
        joined.push_str(paragraph);

        if measure.measure(&joined) <= max_tokens {
            buffer = joined;
        } else {
            chunks.push(std::mem::replace(&mut buffer, paragraph.to_string()));
        }
    }

    // The last chunk is unbounded, so trailing blanks ride on it.
    match chunks.last_mut() {
        Some(last) if buffer.trim().is_empty() => {
            last.push_str(PARAGRAPH_SEPARATOR);
            last.push_str(&buffer);
        }
        _ => chunks.push(buffer),
    }
    chunks
}

pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    chunk_by_paragraph(text, config.max_tokens, &config.heuristic())
}
