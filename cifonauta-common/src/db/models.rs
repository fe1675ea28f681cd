//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;

/// Photo or video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" | "image" => Ok(MediaKind::Photo),
            "video" => Ok(MediaKind::Video),
            other => Err(format!("unknown media datatype '{}'", other)),
        }
    }
}

/// Foreign-key metadata of a media record
///
/// Each link points at a counted entity (size class or place) and is
/// nullable; deleting the target clears the link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaLinks {
    pub size_id: Option<i64>,
    pub sublocation_id: Option<i64>,
    pub city_id: Option<i64>,
    pub state_id: Option<i64>,
    pub country_id: Option<i64>,
}

impl MediaLinks {
    /// Entities referenced by these links
    pub fn entity_refs(&self) -> Vec<EntityRef> {
        [
            (CountedKind::Size, self.size_id),
            (CountedKind::Sublocation, self.sublocation_id),
            (CountedKind::City, self.city_id),
            (CountedKind::State, self.state_id),
            (CountedKind::Country, self.country_id),
        ]
        .into_iter()
        .filter_map(|(kind, id)| id.map(|id| EntityRef::new(kind, id)))
        .collect()
    }
}

/// Media file (photo or video)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: i64,
    pub filepath: String,
    pub datatype: MediaKind,
    pub title: String,
    pub caption: String,
    pub is_public: bool,
    pub highlight: bool,
    pub timestamp: DateTime<Utc>,
    pub pub_date: DateTime<Utc>,
    pub links: MediaLinks,
}

impl<'r> FromRow<'r, SqliteRow> for Media {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        let datatype: String = row.try_get("datatype")?;
        Ok(Self {
            id: row.try_get("id")?,
            filepath: row.try_get("filepath")?,
            datatype: datatype
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            title: row.try_get("title")?,
            caption: row.try_get("caption")?,
            is_public: row.try_get("is_public")?,
            highlight: row.try_get("highlight")?,
            timestamp: row.try_get("timestamp")?,
            pub_date: row.try_get("pub_date")?,
            links: MediaLinks {
                size_id: row.try_get("size_id")?,
                sublocation_id: row.try_get("sublocation_id")?,
                city_id: row.try_get("city_id")?,
                state_id: row.try_get("state_id")?,
                country_id: row.try_get("country_id")?,
            },
        })
    }
}

/// Input for creating a media record
#[derive(Debug, Clone)]
pub struct NewMedia {
    pub filepath: String,
    pub datatype: MediaKind,
    pub title: String,
    pub caption: String,
    pub is_public: bool,
    pub highlight: bool,
    pub timestamp: DateTime<Utc>,
    pub links: MediaLinks,
}

impl NewMedia {
    pub fn new(filepath: impl Into<String>, datatype: MediaKind) -> Self {
        Self {
            filepath: filepath.into(),
            datatype,
            title: String::new(),
            caption: String::new(),
            is_public: false,
            highlight: false,
            timestamp: Utc::now(),
            links: MediaLinks::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_links(mut self, links: MediaLinks) -> Self {
        self.links = links;
        self
    }
}

/// How a counted entity reaches its media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    /// Join table `join_table(entity_column, media_id)`
    ManyToMany {
        join_table: &'static str,
        entity_column: &'static str,
    },
    /// Nullable column on `media`
    ForeignKey { media_column: &'static str },
}

/// Entities carrying cached `image_count` / `video_count` fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountedKind {
    Author,
    Source,
    Tag,
    Size,
    Sublocation,
    City,
    State,
    Country,
    Reference,
    Tour,
}

impl CountedKind {
    pub const ALL: [CountedKind; 10] = [
        CountedKind::Author,
        CountedKind::Source,
        CountedKind::Tag,
        CountedKind::Size,
        CountedKind::Sublocation,
        CountedKind::City,
        CountedKind::State,
        CountedKind::Country,
        CountedKind::Reference,
        CountedKind::Tour,
    ];

    /// Backing table name
    pub fn table(&self) -> &'static str {
        match self {
            CountedKind::Author => "authors",
            CountedKind::Source => "sources",
            CountedKind::Tag => "tags",
            CountedKind::Size => "sizes",
            CountedKind::Sublocation => "sublocations",
            CountedKind::City => "cities",
            CountedKind::State => "states",
            CountedKind::Country => "countries",
            CountedKind::Reference => "bib_references",
            CountedKind::Tour => "tours",
        }
    }

    pub fn association(&self) -> Association {
        match self {
            CountedKind::Author => Association::ManyToMany {
                join_table: "author_media",
                entity_column: "author_id",
            },
            CountedKind::Source => Association::ManyToMany {
                join_table: "source_media",
                entity_column: "source_id",
            },
            CountedKind::Tag => Association::ManyToMany {
                join_table: "tag_media",
                entity_column: "tag_id",
            },
            CountedKind::Reference => Association::ManyToMany {
                join_table: "reference_media",
                entity_column: "reference_id",
            },
            CountedKind::Tour => Association::ManyToMany {
                join_table: "tour_media",
                entity_column: "tour_id",
            },
            CountedKind::Size => Association::ForeignKey { media_column: "size_id" },
            CountedKind::Sublocation => Association::ForeignKey {
                media_column: "sublocation_id",
            },
            CountedKind::City => Association::ForeignKey { media_column: "city_id" },
            CountedKind::State => Association::ForeignKey { media_column: "state_id" },
            CountedKind::Country => Association::ForeignKey {
                media_column: "country_id",
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CountedKind::Author => "author",
            CountedKind::Source => "source",
            CountedKind::Tag => "tag",
            CountedKind::Size => "size",
            CountedKind::Sublocation => "sublocation",
            CountedKind::City => "city",
            CountedKind::State => "state",
            CountedKind::Country => "country",
            CountedKind::Reference => "reference",
            CountedKind::Tour => "tour",
        }
    }
}

impl fmt::Display for CountedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountedKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CountedKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown entity kind '{}'", s))
    }
}

/// Reference to one counted entity row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: CountedKind,
    pub id: i64,
}

impl EntityRef {
    pub fn new(kind: CountedKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Cached counters of an entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub image_count: i64,
    pub video_count: i64,
}

impl EntityCounts {
    pub fn media_count(&self) -> i64 {
        self.image_count + self.video_count
    }
}

/// Author, source, tag, size, place, reference or tour
///
/// Only the fields shared by every counted table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountedEntity {
    pub kind: CountedKind,
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub counts: EntityCounts,
}

impl CountedEntity {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind, self.id)
    }

    pub(crate) fn from_row(kind: CountedKind, row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            kind,
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            counts: EntityCounts {
                image_count: row.try_get("image_count")?,
                video_count: row.try_get("video_count")?,
            },
        })
    }
}

/// Organism size classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeClass {
    Nano,
    Micro,
    Mili,
    Centi,
    Macro,
}

impl SizeClass {
    pub const ALL: [SizeClass; 5] = [
        SizeClass::Nano,
        SizeClass::Micro,
        SizeClass::Mili,
        SizeClass::Centi,
        SizeClass::Macro,
    ];

    /// Stored name of the class
    pub fn label(&self) -> &'static str {
        match self {
            SizeClass::Nano => "<0,1 mm",
            SizeClass::Micro => "0,1 - 1,0 mm",
            SizeClass::Mili => "1,0 - 10 mm",
            SizeClass::Centi => "10 - 100 mm",
            SizeClass::Macro => ">100 mm",
        }
    }

    /// Display order
    pub fn position(&self) -> i64 {
        match self {
            SizeClass::Nano => 0,
            SizeClass::Micro => 1,
            SizeClass::Mili => 2,
            SizeClass::Centi => 3,
            SizeClass::Macro => 4,
        }
    }
}

/// Display language of translated fields
///
/// Portuguese is the catalog's own language; English values fall back to
/// it when missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[default]
    Portuguese,
    English,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Portuguese => "pt_br",
            Language::English => "en",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "pt" | "pt_br" => Ok(Language::Portuguese),
            "en" | "en_us" => Ok(Language::English),
            other => Err(format!("unknown language '{}'", other)),
        }
    }
}

/// Group of tags (habitat, life stage, technique...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCategory {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
}

impl<'r> FromRow<'r, SqliteRow> for TagCategory {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            description: row.try_get("description")?,
        })
    }
}

/// Curated sequence of media
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tour {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub is_public: bool,
    pub pub_date: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub counts: EntityCounts,
}

impl<'r> FromRow<'r, SqliteRow> for Tour {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            description: row.try_get("description")?,
            is_public: row.try_get("is_public")?,
            pub_date: row.try_get("pub_date")?,
            timestamp: row.try_get("timestamp")?,
            counts: EntityCounts {
                image_count: row.try_get("image_count")?,
                video_count: row.try_get("video_count")?,
            },
        })
    }
}

/// Input for creating a tour
#[derive(Debug, Clone, Default)]
pub struct NewTour {
    pub name: String,
    pub description: String,
    pub is_public: bool,
    /// Members in tour order
    pub media_ids: Vec<i64>,
}

/// Ordinal of one media item inside a tour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TourPosition {
    pub tour_id: i64,
    pub media_id: i64,
    pub position: i64,
}

impl<'r> FromRow<'r, SqliteRow> for TourPosition {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            tour_id: row.try_get("tour_id")?,
            media_id: row.try_get("media_id")?,
            position: row.try_get("position")?,
        })
    }
}

/// Node of the taxonomic tree
///
/// `tree_id`, `lft`, `rght` and `level` are nested-set coordinates owned
/// by [`crate::taxonomy::nested_set`]; callers never set them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
    pub id: i64,
    pub name: String,
    pub slug: String,
    /// Empty string means unranked
    pub rank: String,
    /// WoRMS identifier
    pub aphia: Option<i64>,
    pub parent_id: Option<i64>,
    pub tree_id: i64,
    pub lft: i64,
    pub rght: i64,
    pub level: i64,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Taxon {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Number of descendants implied by the coordinates
    pub fn descendant_count(&self) -> i64 {
        (self.rght - self.lft - 1) / 2
    }
}

impl<'r> FromRow<'r, SqliteRow> for Taxon {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            rank: row.try_get("rank")?,
            aphia: row.try_get("aphia")?,
            parent_id: row.try_get("parent_id")?,
            tree_id: row.try_get("tree_id")?,
            lft: row.try_get("lft")?,
            rght: row.try_get("rght")?,
            level: row.try_get("level")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

/// Input for creating a taxon
#[derive(Debug, Clone, Default)]
pub struct NewTaxon {
    pub name: String,
    pub rank: String,
    pub aphia: Option<i64>,
    pub parent_id: Option<i64>,
}

impl NewTaxon {
    pub fn new(name: impl Into<String>, rank: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rank: rank.into(),
            ..Default::default()
        }
    }

    pub fn under(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_aphia(mut self, aphia: i64) -> Self {
        self.aphia = Some(aphia);
        self
    }
}
