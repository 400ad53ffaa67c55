use crate::types::Pagination;

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Slice `[skip, skip + limit)` out of the full ordered set. Out-of-range
/// pages come back empty with `current_page` echoed unchanged.
pub fn paginate<T>(items: Vec<T>, page: usize, limit: usize) -> Page<T> {
    let limit = limit.max(1);
    let total_records = items.len();
    let skip = page.saturating_sub(1).saturating_mul(limit);
    let items = items.into_iter().skip(skip).take(limit).collect();
    Page {
        items,
        pagination: Pagination {
            total_records,
            total_pages: total_records.div_ceil(limit),
            current_page: page,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_partial_page() {
        let p = paginate((0..250).collect::<Vec<_>>(), 3, 100);
        assert_eq!(p.items.len(), 50);
        assert_eq!(p.items[0], 200);
        assert_eq!(
            p.pagination,
            Pagination { total_records: 250, total_pages: 3, current_page: 3 }
        );
    }

    #[test]
    fn test_page_past_the_end() {
        let p = paginate((0..250).collect::<Vec<_>>(), 5, 100);
        assert!(p.items.is_empty());
        assert_eq!(p.pagination.current_page, 5);
        assert_eq!(p.pagination.total_pages, 3);
    }

    #[test]
    fn test_empty_set() {
        let p = paginate(Vec::<u8>::new(), 1, 100);
        assert!(p.items.is_empty());
        assert_eq!(
            p.pagination,
            Pagination { total_records: 0, total_pages: 0, current_page: 1 }
        );
    }

    #[test]
    fn test_returned_length_bound() {
        for total in [0usize, 1, 9, 10, 11, 57] {
            for page in 1..=8 {
                let limit = 10;
                let p = paginate((0..total).collect::<Vec<_>>(), page, limit);
                let skip = (page - 1) * limit;
                assert_eq!(p.items.len(), limit.min(total.saturating_sub(skip)));
            }
        }
    }
}
