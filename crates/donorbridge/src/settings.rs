//! Typed sync configuration.
//!
//! The engine receives a resolved [`SyncSettings`]; where it came from (config
//! file, environment, admin form) is the caller's concern.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::destination::CodeField;

/// GL code used when none is configured.
pub const DEFAULT_GL_CODE: &str = "UN";

/// Gift type sent for gateways missing from the gateway map.
pub const UNMAPPED_GIFT_TYPE: &str = "OTHER";

/// Sub-solicit code for one-time gifts.
pub const SUB_SOLICIT_ONETIME: &str = "ONETIME";

/// Sub-solicit code for subscription gifts.
pub const SUB_SOLICIT_RECURRING: &str = "RECURRING";

/// Settings that shape every gift the engine creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Whether new donations are pushed as they complete. Backfill and
    /// single-donation sync work either way.
    pub sync_enabled: bool,
    /// Destination API key.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub default_gl_code: String,
    /// Empty means "no campaign".
    pub default_campaign: String,
    /// Empty means "no solicit code".
    pub default_solicit_code: String,
    /// Gateway id to destination gift type code (e.g. `stripe` -> `CC`).
    pub gateway_map: BTreeMap<String, String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_enabled: false,
            api_key: String::new(),
            default_gl_code: DEFAULT_GL_CODE.to_string(),
            default_campaign: String::new(),
            default_solicit_code: String::new(),
            gateway_map: BTreeMap::new(),
        }
    }
}

impl SyncSettings {
    /// Gift type for a gateway, or [`UNMAPPED_GIFT_TYPE`] when the gateway is
    /// not in the map. Lookup ignores ASCII case and surrounding whitespace.
    pub fn gift_type_for(&self, gateway: &str) -> &str {
        let gateway = gateway.trim();
        self.gateway_map
            .get(gateway)
            .or_else(|| {
                self.gateway_map
                    .iter()
                    .find(|(k, _)| k.trim().eq_ignore_ascii_case(gateway))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
            .unwrap_or(UNMAPPED_GIFT_TYPE)
    }

    /// GL code, falling back to [`DEFAULT_GL_CODE`] when blank.
    pub fn gl_code(&self) -> &str {
        non_blank(&self.default_gl_code).unwrap_or(DEFAULT_GL_CODE)
    }

    pub fn campaign(&self) -> Option<&str> {
        non_blank(&self.default_campaign)
    }

    pub fn solicit_code(&self) -> Option<&str> {
        non_blank(&self.default_solicit_code)
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Every code a gift may carry, for validation against the destination.
    ///
    /// Blank optional codes are left out. The sub-solicit codes are always
    /// listed since every gift carries one of them. Mapped gift types follow,
    /// each listed once.
    pub fn codes_to_validate(&self) -> Vec<(CodeField, String)> {
        let mut codes = vec![(CodeField::GlCode, self.gl_code().to_string())];
        if let Some(campaign) = self.campaign() {
            codes.push((CodeField::Campaign, campaign.to_string()));
        }
        if let Some(solicit) = self.solicit_code() {
            codes.push((CodeField::SolicitCode, solicit.to_string()));
        }
        codes.push((CodeField::SubSolicitCode, SUB_SOLICIT_ONETIME.to_string()));
        codes.push((CodeField::SubSolicitCode, SUB_SOLICIT_RECURRING.to_string()));
        let gift_types: BTreeSet<&str> = self
            .gateway_map
            .values()
            .filter_map(|v| non_blank(v))
            .collect();
        codes.extend(
            gift_types
                .into_iter()
                .map(|t| (CodeField::GiftType, t.to_string())),
        );
        codes
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
