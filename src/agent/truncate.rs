//! Byte-budgeted truncation of tool results fed back to the model.

/// Inserted between the kept head and tail.
pub const OMITTED_MARKER: &str = "\n...[omitted]...\n";

/// Shrink `text` to at most `budget` bytes, keeping ~70% head and the tail.
///
/// Cuts always land on UTF-8 char boundaries.
pub fn truncate_tool_result(text: &str, budget: usize) -> String {
    if text.len() <= budget {
        return text.to_string();
    }
    if budget <= OMITTED_MARKER.len() {
        return text[..floor_boundary(text, budget)].to_string();
    }

    let head_budget = (budget * 7 / 10).min(budget - OMITTED_MARKER.len());
    let head_end = floor_boundary(text, head_budget);
    let tail_budget = budget - head_end - OMITTED_MARKER.len();
    let tail_start = ceil_boundary(text, text.len() - tail_budget);

    let mut out = String::with_capacity(budget);
    out.push_str(&text[..head_end]);
    out.push_str(OMITTED_MARKER);
    out.push_str(&text[tail_start..]);
    out
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
