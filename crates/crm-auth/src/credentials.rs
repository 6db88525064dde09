//! NTLM connection credentials.

/// Credentials for an NTLM-authenticated connection.
///
/// `workstation` is the name the client reports for itself in the negotiate
/// message; the CRM manager fills it with the service hostname, matching what
/// on-premise deployments expect.
///
/// The password is redacted in `Debug` output to prevent accidental exposure
/// in logs.
#[derive(Clone)]
pub struct NtlmCredentials {
    /// Account name, without the domain prefix.
    pub username: String,
    password: String,
    /// Active Directory domain.
    pub domain: String,
    /// Workstation name reported to the server.
    pub workstation: String,
}

impl std::fmt::Debug for NtlmCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtlmCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("workstation", &self.workstation)
            .finish()
    }
}

impl NtlmCredentials {
    /// Create new credentials.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
        workstation: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: domain.into(),
            workstation: workstation.into(),
        }
    }

    /// Get the password (for internal use by the message builders).
    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let creds = NtlmCredentials::new("jdoe", "super_secret", "CONTOSO", "crm.contoso.com");
        let debug_output = format!("{:?}", creds);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret"));
        assert!(debug_output.contains("jdoe"));
        assert!(debug_output.contains("CONTOSO"));
    }
}
