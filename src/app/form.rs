/// A single-line text input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub id: String,
    pub label: String,
    pub value: String,
    /// Rendered as bullets.
    pub secret: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    pub fields: Vec<Field>,
}
impl Form {
    pub fn new(fields: &[(&str, &str)]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(id, label)| Field {
                    id: (*id).to_string(),
                    label: (*label).to_string(),
                    value: String::new(),
                    secret: false,
                })
                .collect(),
        }
    }

    pub fn with_secret(mut self, id: &str) -> Self {
        if let Some(field) = self.field_mut(id) {
            field.secret = true;
        }
        self
    }

    pub fn with_value(mut self, id: &str, value: impl Into<String>) -> Self {
        if let Some(field) = self.field_mut(id) {
            field.value = value.into();
        }
        self
    }

    pub fn field_mut(&mut self, id: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|field| field.id == id)
    }

    pub fn has(&self, id: &str) -> bool {
        self.fields.iter().any(|field| field.id == id)
    }

    pub fn value(&self, id: &str) -> &str {
        self.fields
            .iter()
            .find(|field| field.id == id)
            .map(|field| field.value.as_str())
            .unwrap_or_default()
    }

    /// Trimmed, or `None` when blank.
    pub fn optional(&self, id: &str) -> Option<String> {
        Some(self.value(id).trim()).filter(|value| !value.is_empty()).map(str::to_string)
    }

    pub fn clear(&mut self) {
        for field in &mut self.fields {
            field.value.clear();
        }
    }
}
