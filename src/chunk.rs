//! Sentence-boundary text chunker.
//!
//! Splits document text into sentences (terminator `.`/`!`/`?` followed
//! by whitespace) and greedily packs whole sentences into chunks of at
//! most `chunk_size` words. A closing chunk seeds its successor with a
//! trailing window of whole sentences totalling at least `chunk_overlap`
//! words. No sentence is ever cut mid-stream: a sentence longer than the
//! size target is still placed whole, and every chunk boundary falls
//! exactly on a sentence boundary.

use crate::models::{chunk_id, Chunk, Document};

/// Split text into sentences. A boundary is a `.`, `!` or `?` followed by
/// whitespace (or end of input). Trailing text without a terminator is
/// kept as a final sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = iter
                .peek()
                .map_or(true, |&(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                start = end;
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split a document into chunks of at most `chunk_size` words, with a
/// whole-sentence overlap window of `chunk_overlap` words.
///
/// Every document produces at least one chunk, even when empty or
/// shorter than `chunk_size`. `total_chunks` is stamped on every chunk
/// after the whole split is known.
pub fn chunk_document(doc: &Document, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let sentences = split_sentences(&doc.content);

    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_words = 0;

    for sentence in sentences {
        let words = word_count(&sentence);

        if !current.is_empty() && current_words + words > chunk_size {
            // Close the chunk, then seed the next one with whole trailing
            // sentences until the overlap word budget is reached.
            let mut seed: Vec<String> = Vec::new();
            let mut seed_words = 0;
            if chunk_overlap > 0 {
                for prev in current.iter().rev() {
                    if seed_words >= chunk_overlap {
                        break;
                    }
                    seed_words += word_count(prev);
                    seed.insert(0, prev.clone());
                }
            }
            groups.push(std::mem::take(&mut current));
            current = seed;
            current_words = seed_words;
        }

        current_words += words;
        current.push(sentence);
    }

    if !current.is_empty() {
        groups.push(current);
    }
    if groups.is_empty() {
        groups.push(vec![doc.content.trim().to_string()]);
    }

    let total = groups.len();
    groups
        .into_iter()
        .enumerate()
        .map(|(i, group)| Chunk {
            id: chunk_id(&doc.id, i),
            parent_id: doc.id.clone(),
            content: group.join(" "),
            chunk_index: i,
            total_chunks: total,
            source_ref: doc.source_ref.clone(),
            title: doc.title.clone(),
            doc_type: doc.doc_type.clone(),
            tags: doc.tags.clone(),
            metadata: doc.metadata.clone(),
            embedding: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> Document {
        Document::new("test://doc", content)
    }

    #[test]
    fn test_split_basic_sentences() {
        let sentences = split_sentences("First one. Second one! Third one?");
        assert_eq!(sentences, vec!["First one.", "Second one!", "Third one?"]);
    }

    #[test]
    fn test_split_keeps_inline_dots() {
        // "3.5" has no whitespace after the dot, so it is not a boundary.
        let sentences = split_sentences("Version 3.5 shipped today. It works.");
        assert_eq!(sentences, vec!["Version 3.5 shipped today.", "It works."]);
    }

    #[test]
    fn test_split_trailing_text_without_terminator() {
        let sentences = split_sentences("Done. trailing fragment");
        assert_eq!(sentences, vec!["Done.", "trailing fragment"]);
    }

    #[test]
    fn test_short_document_single_chunk() {
        let chunks = chunk_document(&doc("A. B. C."), 100, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "A. B. C.");
        assert_eq!(chunks[0].total_chunks, 1);
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn test_empty_document_still_yields_one_chunk() {
        let chunks = chunk_document(&doc(""), 100, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].total_chunks, 1);
    }

    #[test]
    fn test_boundaries_fall_on_sentences() {
        let text = "One two three alpha. Four five six beta. Seven eight nine gamma.";
        let chunks = chunk_document(&doc(text), 5, 0);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            // Every chunk must end exactly where a sentence ends.
            assert!(
                chunk.content.ends_with('.'),
                "chunk cut mid-sentence: {:?}",
                chunk.content
            );
        }
    }

    #[test]
    fn test_oversize_sentence_placed_whole() {
        let long = "one two three four five six seven eight nine ten.";
        let text = format!("Short. {long} Tail.");
        let chunks = chunk_document(&doc(&text), 4, 0);
        // The ten-word sentence exceeds the size target but is never split.
        assert!(chunks.iter().any(|c| c.content == long));
    }

    #[test]
    fn test_overlap_seeds_whole_sentences() {
        let text = "alpha beta gamma delta. epsilon zeta eta theta. iota kappa lambda mu.";
        let chunks = chunk_document(&doc(text), 8, 4);
        assert!(chunks.len() >= 2);
        // The second chunk starts with the closed chunk's final sentence.
        assert!(
            chunks[1].content.starts_with("epsilon zeta eta theta."),
            "unexpected overlap seed: {:?}",
            chunks[1].content
        );
    }

    #[test]
    fn test_total_chunks_consistent() {
        let text = (0..30)
            .map(|i| format!("Sentence number {i} with some filler words."))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_document(&doc(&text), 20, 5);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.total_chunks, total);
        }
    }

    #[test]
    fn test_chunk_ids_deterministic() {
        let text = "A b c d e f. G h i j k l. M n o p q r.";
        let first = chunk_document(&doc(text), 6, 0);
        let second = chunk_document(&doc(text), 6, 0);
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.content, b.content);
        }
    }

    #[test]
    fn test_chunks_inherit_document_fields() {
        let document = Document::new("test://tagged", "Alpha. Beta.")
            .with_title("Tagged")
            .with_doc_type("note")
            .with_tags(vec!["a".to_string()]);
        let chunks = chunk_document(&document, 100, 0);
        assert_eq!(chunks[0].title.as_deref(), Some("Tagged"));
        assert_eq!(chunks[0].doc_type.as_deref(), Some("note"));
        assert_eq!(chunks[0].tags, vec!["a".to_string()]);
        assert_eq!(chunks[0].parent_id, document.id);
    }
}
