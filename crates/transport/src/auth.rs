//! Authorization boundary.

/// Supplies the authorization token attached to registry and gateway calls.
///
/// Token retrieval and refresh live outside the connection core; the
/// transport only asks for the current value and fails closed when it is
/// absent or blank.
pub trait AuthProvider: Send + Sync {
    /// Returns the current authorization token, if one is available.
    fn authorization(&self) -> Option<String>;
}

/// Returns the token if it is present and non-blank.
pub(crate) fn non_blank_authorization(auth: &dyn AuthProvider) -> Option<String> {
    auth.authorization().filter(|token| !token.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<&'static str>);

    impl AuthProvider for Fixed {
        fn authorization(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    #[test]
    fn blank_tokens_fail_closed() {
        assert_eq!(non_blank_authorization(&Fixed(None)), None);
        assert_eq!(non_blank_authorization(&Fixed(Some(""))), None);
        assert_eq!(non_blank_authorization(&Fixed(Some("   "))), None);
        assert_eq!(
            non_blank_authorization(&Fixed(Some("Bearer token"))),
            Some("Bearer token".to_string())
        );
    }
}
