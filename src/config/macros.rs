/// Configuration macros for zero-repetition config definitions
///
/// `config_struct!` defines a configuration structure with its defaults
/// embedded in a single declaration.

/// Define a configuration struct with embedded defaults
///
/// Each field is declared with its name, type and default value; the macro
/// generates:
/// - The struct with public fields
/// - The `Default` implementation with the specified values
/// - Serde support with `#[serde(default)]`, so partial TOML files work
///
/// # Example
/// ```
/// livesync::config_struct! {
///     pub struct RetryConfig {
///         max_attempts: u32 = 5,
///         base_delay_ms: u64 = 1_000,
///     }
/// }
///
/// let cfg = RetryConfig::default();
/// assert_eq!(cfg.max_attempts, 5);
/// ```
#[macro_export]
macro_rules! config_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_name:ident: $field_type:ty = $default_value:expr
            ),*
            $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field_name: $field_type,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $(
                        $field_name: $default_value,
                    )*
                }
            }
        }
    };
}
