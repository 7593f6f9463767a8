//! Keyboard focus over the focusable elements of the current view.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selectable {
    pub id: String,
    pub label: String,
    pub disabled: bool,
}
impl Selectable {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            disabled: false,
        }
    }

    pub fn disabled_if(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Focus {
    items: Vec<Selectable>,
    index: Option<usize>,
}
impl Focus {
    /// Swap in a new set of selectables.
    ///
    /// The focused id survives when it is still present and enabled;
    /// otherwise focus lands on the first enabled entry.
    pub fn rebuild(&mut self, items: Vec<Selectable>) {
        let current = self.focused_id().map(str::to_owned);
        self.items = items;
        self.index = current
            .and_then(|id| self.items.iter().position(|item| item.id == id && !item.disabled))
            .or_else(|| self.first_enabled());
    }

    pub fn items(&self) -> &[Selectable] {
        &self.items
    }

    pub fn focused(&self) -> Option<&Selectable> {
        self.index.and_then(|index| self.items.get(index))
    }

    pub fn focused_id(&self) -> Option<&str> {
        self.focused().map(|item| item.id.as_str())
    }

    pub fn is_focused(&self, id: &str) -> bool {
        self.focused_id() == Some(id)
    }

    /// Focus `id` if it exists and is enabled.
    pub fn focus(&mut self, id: &str) -> bool {
        match self.items.iter().position(|item| item.id == id && !item.disabled) {
            Some(index) => {
                self.index = Some(index);
                true
            },
            None => false,
        }
    }

    pub fn next(&mut self) {
        self.step(true);
    }

    pub fn prev(&mut self) {
        self.step(false);
    }

    fn first_enabled(&self) -> Option<usize> {
        self.items.iter().position(|item| !item.disabled)
    }

    fn step(&mut self, forward: bool) {
        let len = self.items.len();
        if len == 0 {
            self.index = None;
            return;
        }
        let start = self.index.unwrap_or(if forward { len - 1 } else { 0 });
        for step in 1..=len {
            let index = if forward { (start + step) % len } else { (start + len - step % len) % len };
            if !self.items[index].disabled {
                self.index = Some(index);
                return;
            }
        }
        self.index = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(spec: &[(&str, bool)]) -> Vec<Selectable> {
        spec.iter().map(|(id, disabled)| Selectable::new(*id, *id).disabled_if(*disabled)).collect()
    }

    #[test]
    fn test_cycling_skips_disabled() {
        let mut focus = Focus::default();
        focus.rebuild(items(&[("a", true), ("b", false), ("c", true), ("d", false)]));
        assert_eq!(focus.focused_id(), Some("b"));
        focus.next();
        assert_eq!(focus.focused_id(), Some("d"));
        focus.next();
        assert_eq!(focus.focused_id(), Some("b"));
        focus.prev();
        assert_eq!(focus.focused_id(), Some("d"));
    }

    #[test]
    fn test_rebuild_keeps_focus_by_id() {
        let mut focus = Focus::default();
        focus.rebuild(items(&[("a", false), ("b", false), ("c", false)]));
        focus.focus("c");
        focus.rebuild(items(&[("x", false), ("c", false)]));
        assert_eq!(focus.focused_id(), Some("c"));
        focus.rebuild(items(&[("x", false), ("c", true)]));
        assert_eq!(focus.focused_id(), Some("x"));
    }

    #[test]
    fn test_all_disabled_has_no_focus() {
        let mut focus = Focus::default();
        focus.rebuild(items(&[("a", true), ("b", true)]));
        assert_eq!(focus.focused(), None);
        focus.next();
        assert_eq!(focus.focused(), None);
        focus.rebuild(Vec::new());
        focus.prev();
        assert_eq!(focus.focused(), None);
    }
}
