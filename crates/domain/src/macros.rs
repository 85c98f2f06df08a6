//! Display/FromStr derivation for label enums
//!
//! Error categories and refresher states are logged as short lowercase labels
//! and read back from configuration or log filters. This macro keeps both
//! directions in one table.
//!
//! # Example
//!
//! ```rust
//! use ledgerlink_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum GrantKind {
//!     AuthorizationCode,
//!     RefreshToken,
//! }
//!
//! impl_domain_status_conversions!(GrantKind {
//!     AuthorizationCode => "authorization_code",
//!     RefreshToken => "refresh_token",
//! });
//!
//! assert_eq!(GrantKind::RefreshToken.to_string(), "refresh_token");
//! assert_eq!("AUTHORIZATION_CODE".parse::<GrantKind>(), Ok(GrantKind::AuthorizationCode));
//! ```

/// Implements `Display` and `FromStr` for a fieldless label enum
///
/// `Display` writes the label verbatim; `FromStr` lowercases its input before
/// matching, so labels must be written in lowercase. Unknown input yields
/// `Err("Invalid <Enum>: <input>")`.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl ::std::str::FromStr for $enum_name {
            type Err = ::std::string::String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => ::std::result::Result::Ok(Self::$variant),)+
                    _ => ::std::result::Result::Err(::std::format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
