//! Wallet top-up form: preset or custom amount, never both.

/// Preset top-up amounts, in currency units
pub const TOP_UP_PRESETS: [u64; 3] = [10, 50, 100];

/// Amount selection for a balance top-up
///
/// Choosing a preset clears the custom text and typing a custom amount
/// clears the preset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopUpForm {
    selected_preset: Option<u64>,
    custom: String,
}

impl TopUpForm {
    /// Empty form
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select one of [`TOP_UP_PRESETS`]; other values are ignored
    pub fn select_preset(&mut self, amount: u64) {
        if TOP_UP_PRESETS.contains(&amount) {
            self.selected_preset = Some(amount);
            self.custom.clear();
        }
    }

    /// Replace the custom amount text
    pub fn set_custom(&mut self, text: impl Into<String>) {
        self.custom = text.into();
        self.selected_preset = None;
    }

    /// Selected preset, if any
    #[must_use]
    pub const fn selected_preset(&self) -> Option<u64> {
        self.selected_preset
    }

    /// Custom amount text as typed
    #[must_use]
    pub fn custom(&self) -> &str {
        &self.custom
    }

    /// Amount to credit; `None` until a preset is chosen or the custom text
    /// is a positive integer
    #[must_use]
    pub fn amount(&self) -> Option<u64> {
        if let Some(preset) = self.selected_preset {
            return Some(preset);
        }
        self.custom.trim().parse::<u64>().ok().filter(|amount| *amount > 0)
    }

    /// Forget the selection
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_and_custom_exclude_each_other() {
        let mut form = TopUpForm::new();
        form.set_custom("75");
        form.select_preset(50);
        assert_eq!(form.custom(), "");
        assert_eq!(form.amount(), Some(50));

        form.set_custom("120");
        assert_eq!(form.selected_preset(), None);
        assert_eq!(form.amount(), Some(120));
    }

    #[test]
    fn custom_amount_must_be_a_positive_integer() {
        let mut form = TopUpForm::new();
        for text in ["", "0", "-5", "12.5", "abc"] {
            form.set_custom(text);
            assert_eq!(form.amount(), None, "{text:?}");
        }
        form.set_custom(" 30 ");
        assert_eq!(form.amount(), Some(30));
    }

    #[test]
    fn unknown_preset_is_ignored() {
        let mut form = TopUpForm::new();
        form.select_preset(20);
        assert_eq!(form.amount(), None);
    }
}
