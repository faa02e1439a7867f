//! Structure-aware chunking: detects markdown regions, packs them greedily under a token
//! budget, and re-merges compatible neighbors back up toward a target size.

use text_splitter::TextSplitter;
use unicode_normalization::UnicodeNormalization;

/// Structural kind detected for one region of the source text, or for a packed chunk
/// that mixes several regions with no clear plurality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    CodeFence,
    Heading,
    List,
    Table,
    Paragraph,
    Mixed,
}

#[derive(Debug, Clone)]
struct Region {
    kind: RegionKind,
    start: usize,
    end: usize,
}

/// One assembled chunk, ready to become a `ContextNode`.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub token_count: u32,
    pub chunk_type: RegionKind,
    pub chunk_index: u32,
    pub importance: f32,
    /// Nearest preceding heading path, joined by " > "; belongs in the node's summary
    /// prefix, never in its content.
    pub heading_path: String,
}

/// `ceil(chars / 4)`, deterministic and monotone in length, as the token estimator contract
/// requires when no provider-specific tokenizer is available.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    ((chars + 3) / 4) as u32
}

fn importance_for(kind: RegionKind) -> f32 {
    match kind {
        RegionKind::Heading => 0.8,
        RegionKind::CodeFence => 0.7,
        RegionKind::List => 0.5,
        RegionKind::Table | RegionKind::Paragraph => 0.6,
        RegionKind::Mixed => 0.6,
    }
}

fn compatible(a: RegionKind, b: RegionKind) -> bool {
    matches!(
        (a, b),
        (RegionKind::Paragraph, RegionKind::Paragraph) | (RegionKind::List, RegionKind::List)
    )
}

/// Picks the kind with the most packed tokens; ties (including an empty tally) fall back
/// to [`RegionKind::Mixed`] since no single kind dominated the chunk.
fn plurality_kind(totals: &std::collections::HashMap<RegionKind, u32>) -> RegionKind {
    let mut best: Option<(RegionKind, u32)> = None;
    let mut tied = false;
    for (&kind, &tokens) in totals {
        match best {
            Some((_, best_tokens)) if tokens > best_tokens => {
                best = Some((kind, tokens));
                tied = false;
            }
            Some((_, best_tokens)) if tokens == best_tokens => tied = true,
            None => best = Some((kind, tokens)),
            _ => {}
        }
    }
    match best {
        Some((kind, _)) if !tied => kind,
        _ => RegionKind::Mixed,
    }
}

/// Chunks `content` under `max_tokens`, optionally merging adjacent compatible chunks back
/// up toward `target_tokens`. Never fails: malformed or plain-text input degrades to a
/// single paragraph region subdivided by the greedy packer.
pub fn chunk(content: &str, max_tokens: u32, target_tokens: u32) -> Vec<Chunk> {
    let normalized = normalize_line_endings(content);
    if normalized.trim().is_empty() {
        return Vec::new();
    }

    if estimate_tokens(&normalized) <= max_tokens
        && !has_code_fence(&normalized)
        && !has_heading(&normalized)
    {
        return vec![Chunk {
            content: normalized.clone(),
            token_count: estimate_tokens(&normalized),
            chunk_type: RegionKind::Paragraph,
            chunk_index: 0,
            importance: importance_for(RegionKind::Paragraph),
            heading_path: String::new(),
        }];
    }

    let regions = detect_structure(&normalized);
    let segments = merge_same_kind_runs(regions);
    let packed = greedy_pack(&normalized, segments, max_tokens);
    let merged = semantic_group(packed, target_tokens);

    merged
        .into_iter()
        .enumerate()
        .map(|(index, mut chunk)| {
            chunk.chunk_index = index as u32;
            chunk
        })
        .collect()
}

fn normalize_line_endings(text: &str) -> String {
    let line_endings_normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    line_endings_normalized.nfc().collect()
}

fn has_code_fence(text: &str) -> bool {
    text.lines().any(|l| l.trim_start().starts_with("```"))
}

fn has_heading(text: &str) -> bool {
    text.lines().any(|l| l.trim_start().starts_with('#'))
}

/// Single pass over lines, classifying each line and recording byte ranges of
/// same-kind runs. Code fences and tables are atomic: once opened, a fence run absorbs
/// every line until its closing fence regardless of apparent kind changes inside it.
fn detect_structure(text: &str) -> Vec<Region> {
    let mut regions = Vec::new();
    let mut offset = 0usize;
    let mut in_fence = false;
    let mut current: Option<(RegionKind, usize)> = None;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let line_start = offset;
        let line_end = offset + line.len();
        offset = line_end;

        let is_fence_delim = trimmed.starts_with("```");
        let kind = if in_fence || is_fence_delim {
            RegionKind::CodeFence
        } else if trimmed.starts_with('#') {
            RegionKind::Heading
        } else if trimmed.starts_with('|') {
            RegionKind::Table
        } else if trimmed.starts_with("- ") || trimmed.starts_with("* ") || starts_with_ordinal(trimmed)
        {
            RegionKind::List
        } else if trimmed.trim().is_empty() {
            current.as_ref().map_or(RegionKind::Paragraph, |(k, _)| *k)
        } else {
            RegionKind::Paragraph
        };

        if is_fence_delim {
            in_fence = !in_fence;
        }

        match &current {
            Some((current_kind, start)) if *current_kind == kind => {
                current = Some((*current_kind, *start));
            }
            Some((current_kind, start)) => {
                regions.push(Region {
                    kind: *current_kind,
                    start: *start,
                    end: line_start,
                });
                current = Some((kind, line_start));
            }
            None => current = Some((kind, line_start)),
        }
    }

    if let Some((kind, start)) = current {
        regions.push(Region {
            kind,
            start,
            end: text.len(),
        });
    }

    regions
}

fn starts_with_ordinal(trimmed: &str) -> bool {
    let mut chars = trimmed.chars();
    let mut saw_digit = false;
    for c in chars.by_ref() {
        if c.is_ascii_digit() {
            saw_digit = true;
        } else {
            return saw_digit && (c == '.' || c == ')');
        }
    }
    false
}

/// Coalesces consecutive same-kind regions into atomic segments, per the "runs of
/// consecutive same-kind regions" contract.
fn merge_same_kind_runs(regions: Vec<Region>) -> Vec<Region> {
    let mut merged: Vec<Region> = Vec::new();
    for region in regions {
        match merged.last_mut() {
            Some(last) if last.kind == region.kind => last.end = region.end,
            _ => merged.push(region),
        }
    }
    merged
}

fn greedy_pack(text: &str, segments: Vec<Region>, max_tokens: u32) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current_content = String::new();
    let mut current_kind_totals: std::collections::HashMap<RegionKind, u32> =
        std::collections::HashMap::new();
    let mut current_tokens = 0u32;

    let flush = |content: &mut String,
                 totals: &mut std::collections::HashMap<RegionKind, u32>,
                 chunks: &mut Vec<Chunk>| {
        if !content.trim().is_empty() {
            let kind = plurality_kind(totals);
            chunks.push(Chunk {
                content: content.trim_end_matches('\n').to_string(),
                token_count: estimate_tokens(content),
                chunk_type: kind,
                chunk_index: 0,
                importance: importance_for(kind),
                heading_path: String::new(),
            });
        }
        content.clear();
        totals.clear();
    };

    for segment in segments {
        let segment_text = &text[segment.start..segment.end];
        let segment_tokens = estimate_tokens(segment_text);

        if segment_tokens > max_tokens {
            flush(&mut current_content, &mut current_kind_totals, &mut chunks);
            current_tokens = 0;
            for piece in subdivide(segment_text, max_tokens) {
                let piece_tokens = estimate_tokens(&piece);
                chunks.push(Chunk {
                    content: piece,
                    token_count: piece_tokens,
                    chunk_type: segment.kind,
                    chunk_index: 0,
                    importance: importance_for(segment.kind),
                    heading_path: String::new(),
                });
            }
            continue;
        }

        if current_tokens + segment_tokens > max_tokens {
            flush(&mut current_content, &mut current_kind_totals, &mut chunks);
            current_tokens = 0;
        }

        current_content.push_str(segment_text);
        current_tokens += segment_tokens;
        *current_kind_totals.entry(segment.kind).or_insert(0) += segment_tokens;
    }

    flush(&mut current_content, &mut current_kind_totals, &mut chunks);
    chunks
}

/// Sentence-boundary subdivision via `text-splitter`; falls back to hard word-boundary
/// slicing if a single sentence still exceeds the budget (e.g. one giant unbroken line).
fn subdivide(text: &str, max_tokens: u32) -> Vec<String> {
    let max_chars = (max_tokens as usize) * 4;
    let splitter = TextSplitter::new(0..max_chars);
    let pieces: Vec<String> = splitter.chunks(text).map(str::to_string).collect();

    let mut out = Vec::new();
    for piece in pieces {
        if estimate_tokens(&piece) <= max_tokens {
            out.push(piece);
        } else {
            out.extend(subdivide_by_words(&piece, max_chars));
        }
    }
    out
}

fn subdivide_by_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + word.len() + 1 > max_chars {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Merges adjacent compatible chunks whose combined size stays within `target_tokens`,
/// then stamps heading paths onto the merged sequence.
fn semantic_group(chunks: Vec<Chunk>, target_tokens: u32) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::new();
    for chunk in chunks {
        match merged.last_mut() {
            Some(last)
                if compatible(last.chunk_type, chunk.chunk_type)
                    && last.token_count + chunk.token_count <= target_tokens =>
            {
                last.content.push('\n');
                last.content.push_str(&chunk.content);
                last.token_count += chunk.token_count;
            }
            _ => merged.push(chunk),
        }
    }

    let mut heading_path = String::new();
    for chunk in &mut merged {
        if chunk.chunk_type == RegionKind::Heading {
            heading_path = chunk
                .content
                .lines()
                .next()
                .unwrap_or_default()
                .trim_start_matches('#')
                .trim()
                .to_string();
        }
        chunk.heading_path = heading_path.clone();
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_yields_zero_chunks() {
        assert!(chunk("", 4000, 3000).is_empty());
        assert!(chunk("   \n  ", 4000, 3000).is_empty());
    }

    #[test]
    fn small_plain_content_yields_one_chunk() {
        let chunks = chunk("A single short line.", 4000, 3000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].chunk_type, RegionKind::Paragraph);
    }

    #[test]
    fn code_fences_are_never_split() {
        let content = format!(
            "intro text\n\n```rust\n{}\n```\n\nmore text",
            "let x = 1;\n".repeat(50)
        );
        let chunks = chunk(&content, 60, 45);
        assert!(chunks
            .iter()
            .any(|c| c.chunk_type == RegionKind::CodeFence && c.content.contains("```")));
        for c in &chunks {
            if c.chunk_type == RegionKind::CodeFence {
                let fence_count = c.content.matches("```").count();
                assert_eq!(fence_count % 2, 0, "fence must not be split: {}", c.content);
            }
        }
    }

    #[test]
    fn every_chunk_respects_max_tokens_budget() {
        let content = "word ".repeat(20_000);
        let chunks = chunk(&content, 4000, 3000);
        for c in &chunks {
            assert!(c.token_count <= 4000, "token_count {} exceeds max", c.token_count);
        }
    }

    #[test]
    fn heading_propagates_to_following_chunks() {
        let content = "# Section One\n\nfirst paragraph content here.\n\nsecond paragraph content here.";
        let chunks = chunk(content, 4000, 3000);
        assert!(chunks.iter().any(|c| c.heading_path == "Section One"));
    }

    #[test]
    fn greedy_pack_assigns_plurality_kind_not_first_segment() {
        let first = "# heading\n";
        let second = "this is a considerably longer paragraph that contributes many more \
            estimated tokens than the heading segment did\n";
        let text = format!("{first}{second}");
        let segments = vec![
            Region {
                kind: RegionKind::Heading,
                start: 0,
                end: first.len(),
            },
            Region {
                kind: RegionKind::Paragraph,
                start: first.len(),
                end: text.len(),
            },
        ];
        let chunks = greedy_pack(&text, segments, 4000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, RegionKind::Paragraph);
    }

    #[test]
    fn greedy_pack_emits_mixed_when_no_kind_has_a_majority() {
        let first = "abcd";
        let second = "efgh";
        let text = format!("{first}{second}");
        let segments = vec![
            Region {
                kind: RegionKind::Table,
                start: 0,
                end: first.len(),
            },
            Region {
                kind: RegionKind::List,
                start: first.len(),
                end: text.len(),
            },
        ];
        let chunks = greedy_pack(&text, segments, 4000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, RegionKind::Mixed);
    }

    #[test]
    fn chunk_indices_are_sequential() {
        let content = "para one here.\n\npara two here.\n\npara three here.";
        let chunks = chunk(content, 4000, 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as u32);
        }
    }
}
