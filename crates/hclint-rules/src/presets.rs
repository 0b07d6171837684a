//! Rule presets for common configurations.

use crate::{
    TerraformDocumentedVariables, TerraformRequiredProviders, TerraformUnusedDeclarations,
    TerraformUnusedRequiredProviders,
};
use hclint_core::RuleBox;
use std::str::FromStr;

/// Preset configurations for the `terraform` rule set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Preset {
    /// Rules that are on by default.
    Recommended,
    /// Every rule, each with its own default.
    #[default]
    All,
}

impl Preset {
    /// Returns the rules for this preset.
    #[must_use]
    pub fn rules(self) -> Vec<RuleBox> {
        match self {
            Self::Recommended => recommended_rules(),
            Self::All => all_rules(),
        }
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recommended" => Ok(Self::Recommended),
            "all" => Ok(Self::All),
            other => Err(format!(
                "unknown preset \"{other}\", expected \"recommended\" or \"all\""
            )),
        }
    }
}

/// Returns the recommended set of rules.
///
/// Includes:
/// - `terraform_unused_declarations`
/// - `terraform_required_providers`
/// - `terraform_unused_required_providers`
#[must_use]
pub fn recommended_rules() -> Vec<RuleBox> {
    vec![
        Box::new(TerraformUnusedDeclarations::new()),
        Box::new(TerraformRequiredProviders::new()),
        Box::new(TerraformUnusedRequiredProviders::new()),
    ]
}

/// Returns all available rules.
#[must_use]
pub fn all_rules() -> Vec<RuleBox> {
    let mut rules = recommended_rules();
    rules.push(Box::new(TerraformDocumentedVariables::new()));
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_rules() {
        assert_eq!(Preset::Recommended.rules().len(), 3);
        assert_eq!(Preset::All.rules().len(), 4);
        assert!(Preset::Recommended.rules().iter().all(|r| r.enabled()));
    }

    #[test]
    fn test_parse_preset() {
        assert_eq!("all".parse::<Preset>().unwrap(), Preset::All);
        assert_eq!("recommended".parse::<Preset>().unwrap(), Preset::Recommended);
        assert!("strict".parse::<Preset>().is_err());
    }
}
