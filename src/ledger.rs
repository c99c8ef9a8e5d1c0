use tracing::debug;

/// Cursors discovered so far, indexed by page number.
///
/// Slot `i` holds the cursor needed to fetch page `i`. Slot 0 is always the
/// empty string, since the first page needs no cursor. Slot `i + 1` only exists
/// once page `i` has been observed, which is what makes backward navigation
/// free: every earlier page is addressable without another round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorLedger {
    cursors: Vec<String>,
}

impl Default for CursorLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl CursorLedger {
    pub fn new() -> Self {
        Self {
            cursors: vec![String::new()],
        }
    }

    /// Cursor for `page`, or `None` if that page is not reachable yet.
    pub fn get(&self, page: usize) -> Option<&str> {
        self.cursors.get(page).map(String::as_str)
    }

    /// Record the cursor returned when `page` was fetched.
    ///
    /// Writes slot `page + 1` only if its value differs. Earlier slots are never
    /// touched, and a write that would leave a gap is dropped. Returns whether
    /// the ledger changed.
    pub fn record(&mut self, page: usize, cursor: &str) -> bool {
        let slot = page + 1;
        match slot.cmp(&self.cursors.len()) {
            std::cmp::Ordering::Less => {
                if self.cursors[slot] == cursor {
                    return false;
                }
                self.cursors[slot] = cursor.to_string();
                true
            }
            std::cmp::Ordering::Equal => {
                self.cursors.push(cursor.to_string());
                true
            }
            std::cmp::Ordering::Greater => {
                debug!(
                    "Ignoring cursor for page {page}: ledger only reaches page {}",
                    self.highest_page()
                );
                false
            }
        }
    }

    /// Clear back to the single first-page slot.
    pub fn reset(&mut self) {
        self.cursors.clear();
        self.cursors.push(String::new());
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    /// Never true: slot 0 always exists.
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Highest page index with a recorded cursor.
    pub fn highest_page(&self) -> usize {
        self.cursors.len() - 1
    }

    pub fn as_slice(&self) -> &[String] {
        &self.cursors
    }
}
