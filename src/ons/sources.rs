use once_cell::sync::Lazy;
use serde::Serialize;

use crate::ons::normalize::ValueField;

pub const BASE_URL: &str = "https://integra.ons.org.br/api/energiaagora";

/// Which part of the dashboard a feed contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedGroup {
    /// SIN-wide generation per source; these add up to total generation
    Generation,
    /// Per-region generation, keyed `"Source - Region"`
    Regional,
    Load,
}

/// A known upstream feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub category: &'static str,
    pub endpoint: &'static str,
    pub color: &'static str,
    pub group: FeedGroup,
    pub field: ValueField,
}

impl Feed {
    pub const fn new(
        category: &'static str,
        endpoint: &'static str,
        color: &'static str,
        group: FeedGroup,
    ) -> Self {
        let field = match group {
            FeedGroup::Load => ValueField::Carga,
            _ => ValueField::Geracao,
        };
        Self {
            category,
            endpoint,
            color,
            group,
            field,
        }
    }

    pub fn url(&self) -> String {
        format!("{}/Get/{}", BASE_URL, self.endpoint)
    }
}

pub fn reservoirs_url() -> String {
    format!("{}/Get/SituacaoDosReservatorios", BASE_URL)
}

/// All feeds polled by default
pub static FEEDS: Lazy<Vec<Feed>> = Lazy::new(|| {
    use FeedGroup::*;
    vec![
        Feed::new("Eólica", "Geracao_SIN_Eolica_json", "#3498db", Generation),
        Feed::new("Hidráulica", "Geracao_SIN_Hidraulica_json", "#2ecc71", Generation),
        Feed::new("Nuclear", "Geracao_SIN_Nuclear_json", "#9b59b6", Generation),
        Feed::new("Solar", "Geracao_SIN_Solar_json", "#f1c40f", Generation),
        Feed::new("Térmica", "Geracao_SIN_Termica_json", "#e74c3c", Generation),
        Feed::new("Eólica - Norte", "Geracao_Norte_Eolica_json", "#1f618d", Regional),
        Feed::new("Solar - Norte", "Geracao_Norte_Solar_json", "#b7950b", Regional),
        Feed::new("Eólica - Nordeste", "Geracao_Nordeste_Eolica_json", "#2e86c1", Regional),
        Feed::new("Solar - Nordeste", "Geracao_Nordeste_Solar_json", "#d4ac0d", Regional),
        Feed::new(
            "Eólica - Sudeste/Centro-Oeste",
            "Geracao_SudesteECentroOeste_Eolica_json",
            "#5dade2",
            Regional,
        ),
        Feed::new(
            "Solar - Sudeste/Centro-Oeste",
            "Geracao_SudesteECentroOeste_Solar_json",
            "#f4d03f",
            Regional,
        ),
        Feed::new("Eólica - Sul", "Geracao_Sul_Eolica_json", "#85c1e9", Regional),
        Feed::new("Solar - Sul", "Geracao_Sul_Solar_json", "#f7dc6f", Regional),
        Feed::new("SIN", "Carga_SIN_json", "#ecf0f1", Load),
    ]
});

/// Default feeds belonging to one group
pub fn feeds_by_group(group: FeedGroup) -> impl Iterator<Item = &'static Feed> {
    FEEDS.iter().filter(move |feed| feed.group == group)
}
