// src/config/validate.rs

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::model::{RawReleaseFile, ReleaseFile};
use crate::errors::{Result, SupervisorError};

static APP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid regex"));

static PROCESS_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_-]*$").expect("valid regex"));

impl TryFrom<RawReleaseFile> for ReleaseFile {
    type Error = SupervisorError;

    fn try_from(raw: RawReleaseFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_release(&raw)?;
        Ok(ReleaseFile::new_unchecked(raw.app, raw.process))
    }
}

fn validate_raw_release(raw: &RawReleaseFile) -> Result<()> {
    validate_app(raw)?;
    validate_env(raw)?;
    validate_processes(raw)?;
    Ok(())
}

fn validate_app(raw: &RawReleaseFile) -> Result<()> {
    if !APP_NAME.is_match(&raw.app.name) {
        return Err(SupervisorError::ConfigError(format!(
            "[app].name {:?} is not a valid app name",
            raw.app.name
        )));
    }
    Ok(())
}

fn validate_env(raw: &RawReleaseFile) -> Result<()> {
    for key in raw.app.env.keys() {
        if key.is_empty() || key.contains('=') {
            return Err(SupervisorError::ConfigError(format!(
                "[app.env] key {:?} must be non-empty and must not contain '='",
                key
            )));
        }
    }
    Ok(())
}

fn validate_processes(raw: &RawReleaseFile) -> Result<()> {
    let mut seen = HashSet::new();

    for p in raw.process.iter() {
        if !PROCESS_TYPE.is_match(&p.process_type) {
            return Err(SupervisorError::ConfigError(format!(
                "process type {:?} must match {}",
                p.process_type,
                PROCESS_TYPE.as_str()
            )));
        }
        if !seen.insert(p.process_type.as_str()) {
            return Err(SupervisorError::ConfigError(format!(
                "process type '{}' is declared more than once",
                p.process_type
            )));
        }
        if p.args.is_empty() {
            return Err(SupervisorError::ConfigError(format!(
                "process type '{}' has an empty `args`",
                p.process_type
            )));
        }
    }
    Ok(())
}

/// Reject a control file that belongs to a different app than the one the
/// supervisor was started for.
pub fn ensure_app_matches(file: &ReleaseFile, expected: Option<&str>) -> Result<()> {
    match expected {
        Some(name) if !name.is_empty() && name != file.app.name => {
            Err(SupervisorError::ConfigError(format!(
                "control file is for app '{}', but supervisor runs '{}'",
                file.app.name, name
            )))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_str;

    fn validate(toml: &str) -> Result<ReleaseFile> {
        ReleaseFile::try_from(parse_str(toml)?)
    }

    const VALID: &str = r#"
        [app]
        name = "shop"
        version = 3

        [app.env]
        PORT = "5000"

        [[process]]
        type = "web"
        quantity = 2
        args = ["bin/web"]

        [[process]]
        type = "worker"
        args = ["bin/worker", "--queue", "default"]
    "#;

    #[test]
    fn accepts_valid_release() {
        let file = validate(VALID).expect("valid file");
        let release = file.release();
        assert_eq!(release.name(), "shop-3");
        assert_eq!(release.config().get("PORT").map(String::as_str), Some("5000"));

        let forms = file.formations();
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0].process_type(), "web");
        assert_eq!(forms[0].quantity(), 2);
        assert_eq!(forms[1].quantity(), 1, "quantity defaults to 1");
        assert_eq!(forms[1].args(), ["bin/worker", "--queue", "default"]);
    }

    #[test]
    fn release_without_processes_is_allowed() {
        let file = validate("[app]\nname = \"a\"\nversion = 1\n").expect("valid");
        assert!(file.formations().is_empty());
    }

    #[test]
    fn rejects_duplicate_process_types() {
        let err = validate(
            r#"
            [app]
            name = "a"
            version = 1
            [[process]]
            type = "web"
            args = ["x"]
            [[process]]
            type = "web"
            args = ["y"]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"), "{err}");
    }

    #[test]
    fn rejects_empty_args_and_bad_names() {
        let empty_args = "[app]\nname = \"a\"\nversion = 1\n[[process]]\ntype = \"web\"\nargs = []\n";
        assert!(validate(empty_args).is_err());

        let bad_type = "[app]\nname = \"a\"\nversion = 1\n[[process]]\ntype = \"Web!\"\nargs = [\"x\"]\n";
        assert!(validate(bad_type).is_err());

        let bad_app = "[app]\nname = \"\"\nversion = 1\n";
        assert!(validate(bad_app).is_err());
    }

    #[test]
    fn rejects_env_keys_with_equals() {
        let toml = "[app]\nname = \"a\"\nversion = 1\n[app.env]\n\"A=B\" = \"c\"\n";
        assert!(validate(toml).is_err());
    }

    #[test]
    fn app_name_must_match_when_given() {
        let file = validate(VALID).expect("valid");
        assert!(ensure_app_matches(&file, None).is_ok());
        assert!(ensure_app_matches(&file, Some("")).is_ok());
        assert!(ensure_app_matches(&file, Some("shop")).is_ok());
        assert!(ensure_app_matches(&file, Some("other")).is_err());
    }
}
