/// Nested blocking operations share one loading overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Loading {
    count: usize,
    message: String,
    frame: usize,
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

impl Loading {
    pub fn begin(&mut self, message: impl Into<String>) {
        self.count += 1;
        self.message = message.into();
    }

    /// Only the last `end` hides the overlay.
    pub fn end(&mut self) {
        self.count = self.count.saturating_sub(1);
        if self.count == 0 {
            self.message.clear();
        }
    }

    pub fn is_active(&self) -> bool {
        self.count > 0
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn tick(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }

    pub fn spinner(&self) -> &'static str {
        SPINNER[self.frame % SPINNER.len()]
    }
}
