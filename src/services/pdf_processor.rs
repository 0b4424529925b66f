const CHUNK_SIZE: usize = 1000;
const CHUNK_OVERLAP: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("Failed to extract text: {0}")]
    Extract(String),
}

/// Pulls the text layer out of an in-memory PDF.
pub fn extract_text(bytes: &[u8]) -> Result<String, PdfError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| PdfError::Extract(e.to_string()))
}

/// Splits text into overlapping chunks sized for embedding.
///
/// Cuts prefer paragraph breaks, then line breaks, then spaces, and only
/// fall back to a hard cut when a chunk-sized span has no separator at all.
pub fn split_text(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= CHUNK_SIZE {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let hard_end = floor_char_boundary(text, (start + CHUNK_SIZE).min(text.len()));
        let end = if hard_end == text.len() {
            hard_end
        } else {
            pick_boundary(text, start, hard_end)
        };

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end == text.len() {
            break;
        }

        // Step back for overlap, but never behind the previous start.
        let next_start = floor_char_boundary(text, end.saturating_sub(CHUNK_OVERLAP));
        start = if next_start > start { next_start } else { end };
    }

    chunks
}

fn pick_boundary(text: &str, start: usize, hard_end: usize) -> usize {
    let window = &text[start..hard_end];
    let min_len = CHUNK_SIZE / 2;

    for separator in ["\n\n", "\n", " "] {
        if let Some(pos) = window.rfind(separator) {
            if pos >= min_len {
                return start + pos + separator.len();
            }
        }
    }
    hard_end
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut index = index;
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(count: usize) -> String {
        (0..count)
            .map(|i| format!("w{:04}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(split_text("").is_empty());
        assert!(split_text("   \n \t ").is_empty());
    }

    #[test]
    fn test_short_text_is_a_single_chunk() {
        let chunks = split_text("A short document.");
        assert_eq!(chunks, vec!["A short document."]);
    }

    #[test]
    fn test_chunks_respect_the_size_ceiling() {
        let text = numbered_words(500);
        let chunks = split_text(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= CHUNK_SIZE);
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = numbered_words(500);
        let chunks = split_text(&text);

        for pair in chunks.windows(2) {
            let first_word = pair[1].split_whitespace().next().unwrap();
            assert!(
                pair[0].contains(first_word),
                "chunk did not share its opening word with its predecessor"
            );
        }
    }

    #[test]
    fn test_every_word_survives_chunking() {
        let text = numbered_words(500);
        let joined = split_text(&text).join(" ");

        for i in 0..500 {
            let word = format!("w{:04}", i);
            assert!(joined.contains(&word), "missing word {}", word);
        }
    }

    #[test]
    fn test_splits_prefer_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a".repeat(600), "b".repeat(600));
        let chunks = split_text(&text);

        assert_eq!(chunks[0], "a".repeat(600));
    }

    #[test]
    fn test_unbroken_text_is_cut_at_the_ceiling() {
        let text = "x".repeat(2500);
        let chunks = split_text(&text);

        assert!(chunks.len() >= 3);
        assert_eq!(chunks[0].len(), CHUNK_SIZE);
    }
}
