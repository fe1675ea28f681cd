//! WoRMS REST response types
//!
//! Field names follow the service's JSON. Almost everything is nullable
//! upstream, so most fields are optional.

use serde::{Deserialize, Serialize};

/// Taxon record (`AphiaRecord`)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AphiaRecord {
    #[serde(rename = "AphiaID")]
    pub aphia_id: i64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "scientificname", default)]
    pub scientific_name: String,
    #[serde(default)]
    pub authority: Option<String>,
    /// `accepted`, `unaccepted`, `alternate representation`, ...
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "unacceptreason", default)]
    pub unaccept_reason: Option<String>,
    #[serde(rename = "taxonRankID", default)]
    pub taxon_rank_id: Option<i64>,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(rename = "valid_AphiaID", default)]
    pub valid_aphia_id: Option<i64>,
    #[serde(default)]
    pub valid_name: Option<String>,
    #[serde(default)]
    pub valid_authority: Option<String>,
    #[serde(rename = "parentNameUsageID", default)]
    pub parent_name_usage_id: Option<i64>,
    #[serde(default)]
    pub kingdom: Option<String>,
    #[serde(default)]
    pub phylum: Option<String>,
    #[serde(rename = "class", default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub genus: Option<String>,
    #[serde(default)]
    pub citation: Option<String>,
    #[serde(default)]
    pub lsid: Option<String>,
    #[serde(rename = "isMarine", default)]
    pub is_marine: Option<i64>,
    #[serde(rename = "isBrackish", default)]
    pub is_brackish: Option<i64>,
    #[serde(rename = "isFreshwater", default)]
    pub is_freshwater: Option<i64>,
    #[serde(rename = "isTerrestrial", default)]
    pub is_terrestrial: Option<i64>,
    #[serde(rename = "isExtinct", default)]
    pub is_extinct: Option<i64>,
    #[serde(default)]
    pub match_type: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
}

impl AphiaRecord {
    pub fn is_accepted(&self) -> bool {
        self.status.as_deref() == Some("accepted")
    }

    /// Name of the accepted record this one points at, if it is a synonym
    /// or an alternate representation
    pub fn redirect_name(&self) -> Option<&str> {
        match self.status.as_deref() {
            Some("unaccepted") | Some("alternate representation") => self.valid_name.as_deref(),
            _ => None,
        }
    }
}

/// One level of a classification chain, nested through `child`
///
/// The deepest level carries an empty `child` object, which deserializes
/// to a level with `aphia_id == 0`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Classification {
    #[serde(rename = "AphiaID")]
    pub aphia_id: i64,
    pub rank: String,
    #[serde(rename = "scientificname")]
    pub scientific_name: String,
    pub child: Option<Box<Classification>>,
}

impl Classification {
    /// Levels from the top of the chain down to the requested taxon
    pub fn lineage(&self) -> Vec<&Classification> {
        let mut levels = Vec::new();
        let mut current = Some(self);
        while let Some(level) = current {
            if level.aphia_id == 0 {
                break;
            }
            levels.push(level);
            current = level.child.as_deref();
        }
        levels
    }
}

/// Common name of a taxon
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Vernacular {
    pub vernacular: String,
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Distribution record
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Distribution {
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(rename = "locationID", default)]
    pub location_id: Option<String>,
    #[serde(rename = "higherGeography", default)]
    pub higher_geography: Option<String>,
    #[serde(rename = "higherGeographyID", default)]
    pub higher_geography_id: Option<String>,
    #[serde(rename = "recordStatus", default)]
    pub record_status: Option<String>,
    #[serde(rename = "typeStatus", default)]
    pub type_status: Option<String>,
    #[serde(rename = "establishmentMeans", default)]
    pub establishment_means: Option<String>,
    #[serde(default)]
    pub decimal_latitude: Option<f64>,
    #[serde(default)]
    pub decimal_longitude: Option<f64>,
}

/// Literature source attached to a taxon
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Source {
    #[serde(default)]
    pub source_id: Option<i64>,
    #[serde(rename = "use", default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub fulltext: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
}

/// External databases WoRMS cross-references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalIdType {
    Algaebase,
    Bold,
    Dyntaxa,
    Eol,
    Fishbase,
    Iucn,
    Lsid,
    Ncbi,
    Tsn,
    Gisd,
}

impl ExternalIdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalIdType::Algaebase => "algaebase",
            ExternalIdType::Bold => "bold",
            ExternalIdType::Dyntaxa => "dyntaxa",
            ExternalIdType::Eol => "eol",
            ExternalIdType::Fishbase => "fishbase",
            ExternalIdType::Iucn => "iucn",
            ExternalIdType::Lsid => "lsid",
            ExternalIdType::Ncbi => "ncbi",
            ExternalIdType::Tsn => "tsn",
            ExternalIdType::Gisd => "gisd",
        }
    }
}
