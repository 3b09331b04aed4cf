use super::*;

fn squash_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

#[test]
fn short_text_is_one_unchanged_chunk() {
    let chunks = split_text("A. B. C.", 100, false);
    assert_eq!(chunks, vec!["A. B. C.".to_string()]);
}

#[test]
fn small_limit_forces_one_chunk_per_sentence() {
    let chunks = split_text("A. B. C.", 3, false);
    assert_eq!(
        chunks,
        vec!["A.".to_string(), "B.".to_string(), "C.".to_string()]
    );
}

#[test]
fn empty_input_yields_no_chunks() {
    assert!(split_text("", 100, false).is_empty());
    assert!(split_text("   \n\t  ", 100, false).is_empty());
}

#[test]
fn no_chunk_is_blank() {
    let chunks = split_text("First!   Second?\n\n\nThird. ;;; Fourth.", 12, false);
    for chunk in &chunks {
        assert!(!chunk.trim().is_empty());
    }
}

#[test]
fn chunks_respect_the_limit() {
    let text = "The quick brown fox jumps. Over the lazy dog it goes! \
                Sentences vary in length; some are short. Others ramble on \
                for quite a while before stopping? Done."
        .to_string();
    let chunks = split_text(&text, 60, false);

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(
            chunk.chars().count() <= 60,
            "chunk exceeded limit: {chunk:?}"
        );
    }
}

#[test]
fn oversized_sentence_becomes_its_own_chunk() {
    let long_sentence = "x".repeat(100);
    let text = format!("Short one. {long_sentence}. Another short one.");
    let chunks = split_text(&text, 20, false);

    let oversized: Vec<&String> = chunks.iter().filter(|c| c.chars().count() > 20).collect();
    assert_eq!(oversized.len(), 1);
    assert_eq!(oversized[0].chars().count(), 101);
}

#[test]
fn hard_split_bounds_oversized_sentences() {
    let long_sentence = "x".repeat(100);
    let text = format!("Short one. {long_sentence}. Another short one.");
    let chunks = split_text(&text, 20, true);

    for chunk in &chunks {
        assert!(chunk.chars().count() <= 20);
    }
    // The oversized sentence's content survives the split intact.
    assert_eq!(
        squash_whitespace(&chunks.concat()),
        squash_whitespace(&text)
    );
}

#[test]
fn no_content_is_dropped() {
    let text = "Alpha beta gamma. Delta epsilon! Zeta eta theta? Iota; kappa lambda.\n\
                Mu nu xi omicron pi. Rho sigma tau.";
    let chunks = split_text(text, 25, false);

    assert_eq!(
        squash_whitespace(&chunks.concat()),
        squash_whitespace(text)
    );
}

#[test]
fn splitting_is_deterministic() {
    let text = "One sentence here. Another sentence there! And a third one? Plus a fourth.";
    let first = split_text(text, 30, false);
    let second = split_text(text, 30, false);
    assert_eq!(first, second);
}

#[test]
fn cjk_terminators_split_sentences() {
    let chunks = split_text("你好世界。再见世界。", 5, false);
    assert_eq!(chunks, vec!["你好世界。".to_string(), "再见世界。".to_string()]);
}

#[test]
fn chunk_text_assigns_contiguous_indices() {
    let config = ChunkingConfig {
        max_chunk_chars: 64,
        hard_split_oversized: false,
    };
    let text = "First sentence of the document. Second sentence follows on. \
                Third sentence is here too! Fourth one wraps it up?";
    let chunks = chunk_text(text, &config);

    assert!(chunks.len() > 1);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
        assert_eq!(chunk.char_count, chunk.content.chars().count());
        assert!(!chunk.content.trim().is_empty());
    }
}

#[test]
fn three_sentences_fit_one_chunk_with_room() {
    let config = ChunkingConfig {
        max_chunk_chars: 512,
        hard_split_oversized: false,
    };
    let chunks = chunk_text("A. B. C.", &config);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].chunk_index, 0);
    assert_eq!(chunks[0].content, "A. B. C.");
}

#[test]
fn token_estimate() {
    assert_eq!(estimate_token_count("hello world"), 2);
    assert_eq!(estimate_token_count("This is a test."), 5);
    assert_eq!(estimate_token_count(""), 0);
}

#[test]
fn default_config() {
    let config = ChunkingConfig::default();
    assert_eq!(config.max_chunk_chars, 512);
    assert!(!config.hard_split_oversized);
}
