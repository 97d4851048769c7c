//! Splitting result sequences into bounded pages.

/// One page of a chunked reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
  pub items: Vec<T>,
  /// Items still to come after this page
  pub remaining: usize,
}

/// Split `items` into pages of at most `page_size` (clamped to at least 1).
///
/// Produces `ceil(len / page_size)` pages; an empty input produces none.
/// The last page always has `remaining == 0`.
pub fn paginate<T>(items: Vec<T>, page_size: usize) -> Vec<Page<T>> {
  let page_size = page_size.max(1);
  let mut remaining = items.len();
  let mut pages = Vec::with_capacity(remaining.div_ceil(page_size));
  let mut items = items.into_iter();

  while remaining > 0 {
    let page: Vec<T> = items.by_ref().take(page_size).collect();
    remaining -= page.len();
    pages.push(Page { items: page, remaining });
  }
  pages
}
