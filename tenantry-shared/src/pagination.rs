use serde::{Deserialize, Serialize};

/// Envelope returned by every list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub has_next_page: bool,
    pub has_prev_page: bool,
    pub limit: u64,
    pub next_page: Option<u64>,
    pub page: u64,
    pub prev_page: Option<u64>,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// `count` is the total number of matching records, `skip`/`take` the
    /// window `data` was read with.
    pub fn new(data: Vec<T>, count: u64, skip: u64, take: u64) -> Self {
        let end = skip.saturating_add(take);
        let page = if take == 0 { 1 } else { end / take };
        let has_next_page = count > end;
        let has_prev_page = skip > 0;
        let total_pages = if take == 0 { 0 } else { count.div_ceil(take) };

        Self {
            data,
            has_next_page,
            has_prev_page,
            limit: take,
            next_page: has_next_page.then(|| page + 1),
            page,
            prev_page: has_prev_page.then(|| page.saturating_sub(1)),
            total: count,
            total_pages,
        }
    }
}
