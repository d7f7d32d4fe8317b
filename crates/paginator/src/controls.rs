//! Page navigation helpers: control windows and page lists

/// Sliding window of page numbers around `current`
///
/// The window holds `min(limit, last_page)` pages. It is centred on
/// `current` (one extra page on the left for even limits) and shifted back
/// inside `[1, last_page]` when it would cross either edge.
pub fn page_window(current: u32, last_page: u32, limit: u32) -> Vec<u32> {
    let last = i64::from(last_page);
    let limit = i64::from(limit);
    let current = i64::from(current);

    let (mut from, mut to) = (1, last);
    if limit < last {
        let margin_left = limit / 2;
        let margin_right = limit - margin_left - 1;
        from = current - margin_left;
        to = current + margin_right;

        let left_outbound = 1 - from;
        let right_outbound = to - last;
        if right_outbound > 0 {
            to = last;
            from -= right_outbound;
        }
        if left_outbound > 0 {
            from = 1;
            to += left_outbound;
        }
    }

    let from = from.max(1);
    let to = to.min(last);
    (from..=to).filter_map(|p| u32::try_from(p).ok()).collect()
}

/// Every page number `1..=ceil(total / per_page)`
///
/// Empty while the page size is unknown.
pub fn generate_pages(total: u64, per_page: u32) -> Vec<u32> {
    if per_page == 0 {
        return Vec::new();
    }
    let count = total.div_ceil(u64::from(per_page));
    (1..=count).filter_map(|p| u32::try_from(p).ok()).collect()
}
