#![forbid(unsafe_code)]

//! `sigwrap.toml`: defaults for the command line, turned into a
//! [`VerifyContext`] and an [`AttackConfig`].
//!
//! ```toml
//! id_attrs = ["ID", "wsu:Id"]
//! id_resolution = "first-match"
//! c14n_allow_list = ["exc-c14n", "c14n"]
//! trust_anchors = ["ca.pem"]
//! wrapper_name = "Extensions"
//! max_candidates = 10
//!
//! [payload_rewrite]
//! Amount = "999999"
//! ```

use serde::Deserialize;
use sigwrap_attack::{AttackConfig, PayloadRewrite, StrategyClass};
use sigwrap_c14n::C14nMode;
use sigwrap_core::{algorithm, Error};
use sigwrap_dsig::VerifyContext;
use sigwrap_keys::{loader, x509, TrustAnchors};
use sigwrap_xml::{IdAttributeName, IdAttributes, IdResolution};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Extra ID attribute names, on top of `Id`, `ID`, `id` and `xml:id`.
    pub id_attrs: Vec<String>,
    pub id_resolution: Option<String>,
    /// Accepted SignedInfo canonicalization methods; empty means all.
    pub c14n_allow_list: Vec<String>,
    /// PEM or DER certificate files.
    pub trust_anchors: Vec<PathBuf>,
    /// `YYYY-MM-DDTHH:MM:SS`, overrides the clock for validity checks.
    pub verification_time: Option<String>,
    pub wrapper_name: Option<String>,
    pub payload_rewrite: BTreeMap<String, String>,
    /// Strategy classes to run; empty means all.
    pub strategies: Vec<String>,
    pub max_candidates: Option<usize>,
}

impl CliConfig {
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::Other(format!("invalid configuration: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&text)?;
        // Anchor paths are relative to the file that names them.
        if let Some(dir) = path.parent() {
            for anchor in &mut config.trust_anchors {
                if anchor.is_relative() {
                    *anchor = dir.join(&*anchor);
                }
            }
        }
        Ok(config)
    }

    /// Merge command-line payload rules (`Local=text;Other=text`) over the
    /// file's.
    pub fn add_rewrites(&mut self, rules: &str) -> Result<(), Error> {
        let rewrite = rules.parse::<PayloadRewrite>()?;
        for (local, text) in rewrite.rules() {
            self.payload_rewrite.insert(local.clone(), text.clone());
        }
        Ok(())
    }

    pub fn verify_context(&self) -> Result<VerifyContext, Error> {
        let mut ctx = VerifyContext::new();

        let mut id_attrs = IdAttributes::default();
        for name in &self.id_attrs {
            id_attrs.add(name.parse::<IdAttributeName>()?);
        }
        ctx = ctx.with_id_attrs(id_attrs);

        if let Some(policy) = &self.id_resolution {
            ctx = ctx.with_id_resolution(policy.parse::<IdResolution>()?);
        }
        if !self.c14n_allow_list.is_empty() {
            let modes = self
                .c14n_allow_list
                .iter()
                .map(String::as_str)
                .map(parse_c14n_mode)
                .collect::<Result<Vec<_>, _>>()?;
            ctx = ctx.with_c14n_allow_list(modes);
        }
        if !self.trust_anchors.is_empty() {
            let mut anchors = TrustAnchors::new();
            for path in &self.trust_anchors {
                for der in loader::load_certificate_file(path)? {
                    anchors.add_certificate(der)?;
                }
            }
            tracing::debug!(certificates = anchors.certificates().len(), "trust anchors loaded");
            ctx = ctx.with_trust_anchors(anchors);
        }
        if let Some(time) = &self.verification_time {
            ctx = ctx.with_verification_time(x509::parse_verification_time(time)?);
        }
        Ok(ctx)
    }

    pub fn attack_config(&self) -> Result<AttackConfig, Error> {
        let mut payload = PayloadRewrite::new();
        for (local, text) in &self.payload_rewrite {
            payload.add_rule(local, text);
        }
        let mut config = AttackConfig::new(self.verify_context()?).with_payload(payload);
        if let Some(name) = &self.wrapper_name {
            config = config.with_wrapper_name(name);
        }
        if !self.strategies.is_empty() {
            let classes = self
                .strategies
                .iter()
                .map(|s| s.parse::<StrategyClass>())
                .collect::<Result<Vec<_>, _>>()?;
            config = config.with_strategies(classes);
        }
        if let Some(max) = self.max_candidates {
            config = config.with_max_candidates(max);
        }
        Ok(config)
    }
}

/// A canonicalization mode by URI or by short name (`exc-c14n#WithComments`).
pub fn parse_c14n_mode(s: &str) -> Result<C14nMode, Error> {
    let s = s.trim();
    C14nMode::from_uri(s)
        .or_else(|| {
            C14nMode::ALL
                .into_iter()
                .find(|m| algorithm::short_name(m.uri()).eq_ignore_ascii_case(s))
        })
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("canonicalization method: {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_empty_config_is_default() {
        let config = CliConfig::from_toml("").unwrap();
        assert_eq!(config, CliConfig::default());
        let ctx = config.verify_context().unwrap();
        assert!(ctx.trust_anchors.is_none());
        assert_eq!(ctx.c14n_allow_list.len(), C14nMode::ALL.len());
        let attack = config.attack_config().unwrap();
        assert_eq!(attack.strategies.len(), StrategyClass::ALL.len());
        assert!(attack.max_candidates.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = CliConfig::from_toml(
            r#"
            id_attrs = ["wsu:Id"]
            id_resolution = "last"
            c14n_allow_list = ["exc-c14n", "http://www.w3.org/TR/2001/REC-xml-c14n-20010315"]
            wrapper_name = "Padding"
            strategies = ["wrapping", "id_collision"]
            max_candidates = 3

            [payload_rewrite]
            Amount = "999999"
            "#,
        )
        .unwrap();
        let attack = config.attack_config().unwrap();
        assert_eq!(attack.verify.id_resolution, IdResolution::LastMatch);
        assert!(attack
            .verify
            .id_attrs
            .names()
            .contains(&IdAttributeName::Qualified {
                prefix: "wsu".into(),
                local: "Id".into()
            }));
        assert_eq!(
            attack.verify.c14n_allow_list,
            BTreeSet::from([C14nMode::Inclusive, C14nMode::Exclusive])
        );
        assert_eq!(attack.wrapper_name, "Padding");
        assert_eq!(
            attack.strategies.iter().copied().collect::<Vec<_>>(),
            [StrategyClass::Wrapping, StrategyClass::IdCollision]
        );
        assert_eq!(attack.max_candidates, Some(3));
        assert_eq!(attack.payload.rules(), [("Amount".to_owned(), "999999".to_owned())]);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(CliConfig::from_toml("unknown = 1").is_err());
        let bad_mode = CliConfig::from_toml(r#"c14n_allow_list = ["xpath"]"#).unwrap();
        assert!(matches!(bad_mode.verify_context(), Err(Error::UnsupportedAlgorithm(_))));
        let bad_policy = CliConfig::from_toml(r#"id_resolution = "random""#).unwrap();
        assert!(bad_policy.verify_context().is_err());
        let bad_class = CliConfig::from_toml(r#"strategies = ["shuffle"]"#).unwrap();
        assert!(bad_class.attack_config().is_err());
    }

    #[test]
    fn test_command_line_rewrites_override_file() {
        let mut config = CliConfig::from_toml(
            r#"
            [payload_rewrite]
            Amount = "1"
            To = "bob"
            "#,
        )
        .unwrap();
        config.add_rewrites(" Amount=999999; Memo=a=b").unwrap();
        let attack = config.attack_config().unwrap();
        assert_eq!(
            attack.payload.rules(),
            [
                ("Amount".to_owned(), "999999".to_owned()),
                ("Memo".to_owned(), "a=b".to_owned()),
                ("To".to_owned(), "bob".to_owned()),
            ]
        );
        assert!(config.add_rewrites("Amount").is_err());
        assert!(config.add_rewrites("=x").is_err());
    }

    #[test]
    fn test_missing_config_file_is_io_error() {
        let err = CliConfig::load(Path::new("/nonexistent/sigwrap.toml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_parse_c14n_mode() {
        assert_eq!(parse_c14n_mode(algorithm::EXC_C14N).unwrap(), C14nMode::Exclusive);
        assert_eq!(
            parse_c14n_mode("exc-c14n#WithComments").unwrap(),
            C14nMode::ExclusiveWithComments
        );
        assert!(parse_c14n_mode("").is_err());
    }
}
