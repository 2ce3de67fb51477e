use serde::{Deserialize, Serialize};

/// Up to two emergency recipients, held in memory for the life of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactConfiguration {
    pub contact1: Option<String>,
    pub contact2: Option<String>,
}

impl ContactConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite both recipients. No format validation.
    pub fn save(&mut self, contact1: impl Into<String>, contact2: impl Into<String>) {
        self.contact1 = Some(contact1.into());
        self.contact2 = Some(contact2.into());
    }

    /// Recipients that will actually be messaged, in slot order. Only unset
    /// and empty slots are skipped.
    pub fn recipients(&self) -> Vec<String> {
        [&self.contact1, &self.contact2]
            .into_iter()
            .flatten()
            .filter(|c| !c.is_empty())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_has_no_recipients() {
        assert!(ContactConfiguration::new().recipients().is_empty());
    }

    #[test]
    fn test_save_overwrites_both() {
        let mut contacts = ContactConfiguration::new();
        contacts.save("A", "B");
        contacts.save("C", "");
        assert_eq!(contacts.contact1.as_deref(), Some("C"));
        assert_eq!(contacts.contact2.as_deref(), Some(""));
        assert_eq!(contacts.recipients(), vec!["C".to_string()]);
    }

    #[test]
    fn test_no_validation_of_format() {
        let mut contacts = ContactConfiguration::new();
        contacts.save("not a number", "   ");
        assert_eq!(
            contacts.recipients(),
            vec!["not a number".to_string(), "   ".to_string()]
        );
    }
}
