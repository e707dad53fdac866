//! Namespace naming rules.
use anyhow::Result;

use kportal_errors::InvalidName;

/// Maximum length of a namespace name.
const MAX_NAME_LEN: usize = 63;

/// Derive the default namespace for an identity from its email domain.
///
/// The domain is lower-cased and every run of characters other than
/// ASCII letters, digits and `-` is replaced by a single `-`.
pub fn derive_namespace(email: &str) -> Result<String> {
    let domain = match email.rsplit_once('@') {
        Some((_, domain)) => domain,
        None => anyhow::bail!(InvalidName::new("email", email, "the email has no domain")),
    };

    let mut name = String::with_capacity(domain.len());
    let mut replacing = false;
    for c in domain.to_ascii_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            name.push(c);
            replacing = false;
        } else if !replacing {
            name.push('-');
            replacing = true;
        }
    }

    let name: String = name.trim_matches('-').chars().take(MAX_NAME_LEN).collect();
    let name = name.trim_end_matches('-').to_string();
    validate_name(&name)?;
    Ok(name)
}

/// Check the name is a valid DNS-1123 label, as required for namespaces.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!(InvalidName::new("namespace", name, "the name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        anyhow::bail!(InvalidName::new(
            "namespace",
            name,
            "the name is longer than 63 characters",
        ));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_chars {
        anyhow::bail!(InvalidName::new(
            "namespace",
            name,
            "only lowercase letters, digits and '-' are allowed",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        anyhow::bail!(InvalidName::new(
            "namespace",
            name,
            "the name must start and end with a letter or digit",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use kportal_errors::ErrorKind;

    #[test]
    fn derive_from_domain() {
        let name = super::derive_namespace("alice@UCSD.edu").unwrap();
        assert_eq!(name, "ucsd-edu");
    }

    #[test]
    fn derive_collapses_runs() {
        let name = super::derive_namespace("bob@mail..Example_co.uk").unwrap();
        assert_eq!(name, "mail-example-co-uk");
    }

    #[test]
    fn derive_keeps_dashes() {
        let name = super::derive_namespace("carol@my-lab.org").unwrap();
        assert_eq!(name, "my-lab-org");
    }

    #[test]
    fn derive_needs_domain() {
        let error = super::derive_namespace("carol").unwrap_err();
        assert!(ErrorKind::InvalidName.matches(&error));
        let error = super::derive_namespace("carol@").unwrap_err();
        assert!(ErrorKind::InvalidName.matches(&error));
    }

    #[test]
    fn validate_names() {
        super::validate_name("team-x").unwrap();
        super::validate_name("a1").unwrap();
        let long = "a".repeat(64);
        for name in ["", "Team-X", "-team", "team-", "team_x", long.as_str()] {
            let error = super::validate_name(name).unwrap_err();
            assert!(ErrorKind::InvalidName.matches(&error), "{}", name);
        }
    }
}
