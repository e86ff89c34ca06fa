use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;
use unic_langid::LanguageIdentifier;

/// Language used when the user's own is not available
pub const DEFAULT_LANGUAGE: &str = "uz";

/// Bundled Fluent resources, one per supported language
const RESOURCES: &[(&str, &str)] = &[
    ("uz", include_str!("../locales/uz/main.ftl")),
    ("en", include_str!("../locales/en/main.ftl")),
];

/// Localization manager for the admin bot
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a new localization manager with every bundled language
    pub fn new() -> Self {
        let mut bundles = HashMap::new();

        for (code, source) in RESOURCES {
            match Self::create_bundle(code, source) {
                Some(bundle) => {
                    bundles.insert(code.to_string(), bundle);
                }
                None => warn!(language = code, "Skipping unusable locale"),
            }
        }

        Self { bundles }
    }

    /// Create a fluent bundle for a specific locale
    fn create_bundle(code: &str, source: &str) -> Option<FluentBundle<FluentResource>> {
        let locale: LanguageIdentifier = code.parse().ok()?;
        let mut bundle = FluentBundle::new_concurrent(vec![locale]);
        // Names are substituted verbatim, without bidi isolation marks
        bundle.set_use_isolating(false);

        let resource = match FluentResource::try_new(source.to_string()) {
            Ok(resource) => resource,
            Err((resource, errors)) => {
                warn!(language = code, errors = ?errors, "Locale has syntax errors");
                resource
            }
        };
        if let Err(errors) = bundle.add_resource(resource) {
            warn!(language = code, errors = ?errors, "Locale has conflicting messages");
        }

        Some(bundle)
    }

    /// Pick the bundle for a Telegram language code such as `en-US`
    fn bundle_for(&self, language_code: Option<&str>) -> Option<&FluentBundle<FluentResource>> {
        language_code
            .and_then(|code| code.split(['-', '_']).next())
            .map(|primary| primary.to_ascii_lowercase())
            .and_then(|primary| self.bundles.get(&primary))
            .or_else(|| self.bundles.get(DEFAULT_LANGUAGE))
    }

    /// Get a localized message
    pub fn get_message(
        &self,
        key: &str,
        args: Option<&FluentArgs>,
        language_code: Option<&str>,
    ) -> String {
        let Some(bundle) = self.bundle_for(language_code) else {
            return key.to_string();
        };

        let msg = match bundle.get_message(key) {
            Some(msg) => msg,
            None => return format!("Missing translation: {key}"),
        };

        let pattern = match msg.value() {
            Some(pattern) => pattern,
            None => return format!("Missing value for key: {key}"),
        };

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, args, &mut errors);
        if !errors.is_empty() {
            warn!(key, errors = ?errors, "Message formatted with errors");
        }

        value.into_owned()
    }

    /// Get a localized message with simple string arguments
    pub fn get_message_with_args(
        &self,
        key: &str,
        args: &[(&str, &str)],
        language_code: Option<&str>,
    ) -> String {
        let mut fluent_args = FluentArgs::new();
        for (name, value) in args {
            fluent_args.set(*name, FluentValue::from(*value));
        }
        self.get_message(key, Some(&fluent_args), language_code)
    }
}

impl Default for LocalizationManager {
    fn default() -> Self {
        Self::new()
    }
}

static LOCALIZATION_MANAGER: OnceLock<LocalizationManager> = OnceLock::new();

/// Get the global localization manager, building it on first use
pub fn get_localization_manager() -> &'static LocalizationManager {
    LOCALIZATION_MANAGER.get_or_init(LocalizationManager::new)
}

/// Convenience function to get a localized message
pub fn t_lang(key: &str, language_code: Option<&str>) -> String {
    get_localization_manager().get_message(key, None, language_code)
}

/// Convenience function to get a localized message with arguments
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language_code: Option<&str>) -> String {
    get_localization_manager().get_message_with_args(key, args, language_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_language_is_uzbek() {
        assert_eq!(t_lang("regions-title", None), "Viloyatlar");
        assert_eq!(t_lang("regions-title", Some("fr")), "Viloyatlar");
    }

    #[test]
    fn test_region_subtag_is_ignored() {
        assert_eq!(t_lang("regions-title", Some("en-US")), "Regions");
        assert_eq!(t_lang("regions-title", Some("EN")), "Regions");
    }

    #[test]
    fn test_arguments_are_substituted_verbatim() {
        let text = t_args_lang("district-removed", &[("name", "Downtown")], Some("en"));
        assert_eq!(text, "Downtown was deleted");

        let text = t_args_lang("district-removed", &[("name", "Chilonzor")], None);
        assert_eq!(text, "Chilonzor o'chirildi");
    }

    #[test]
    fn test_missing_key() {
        assert_eq!(
            t_lang("no-such-key", Some("en")),
            "Missing translation: no-such-key"
        );
    }

    #[test]
    fn test_every_key_exists_in_every_language() {
        let manager = get_localization_manager();
        let keys: Vec<&str> = RESOURCES[0]
            .1
            .lines()
            .filter_map(|line| line.split_once(" = ").map(|(key, _)| key.trim()))
            .filter(|key| !key.is_empty() && !key.starts_with('#'))
            .collect();
        assert!(!keys.is_empty());

        for (code, _) in RESOURCES {
            for key in &keys {
                let text = manager.get_message(key, None, Some(code));
                assert!(
                    !text.starts_with("Missing"),
                    "{code} is missing {key}"
                );
            }
        }
    }
}
