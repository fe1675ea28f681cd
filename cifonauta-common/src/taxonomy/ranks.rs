//! Rank names in the catalog's two languages
//!
//! Ranks are stored in Portuguese. English names are the ones WoRMS uses.

use crate::db::models::Language;

/// (English, Portuguese)
const RANKS: [(&str, &str); 20] = [
    ("Kingdom", "Reino"),
    ("Subkingdom", "Sub-reino"),
    ("Phylum", "Filo"),
    ("Subphylum", "Subfilo"),
    ("Superclass", "Superclasse"),
    ("Class", "Classe"),
    ("Subclass", "Subclasse"),
    ("Infraclass", "Infraclasse"),
    ("Superorder", "Superordem"),
    ("Order", "Ordem"),
    ("Suborder", "Subordem"),
    ("Infraorder", "Infraordem"),
    ("Superfamily", "Superfamília"),
    ("Family", "Família"),
    ("Subfamily", "Subfamília"),
    ("Tribe", "Tribo"),
    ("Genus", "Gênero"),
    ("Subgenus", "Subgênero"),
    ("Species", "Espécie"),
    ("Subspecies", "Subespécie"),
];

/// Portuguese name of an English rank
///
/// Botanical divisions map onto phyla.
pub fn portuguese_rank(english: &str) -> Option<&'static str> {
    let english = match english {
        "Division" => "Phylum",
        "Subdivision" => "Subphylum",
        other => other,
    };
    RANKS.iter().find(|(en, _)| *en == english).map(|(_, pt)| *pt)
}

/// English name of a stored (Portuguese) rank
pub fn english_rank(portuguese: &str) -> Option<&'static str> {
    RANKS.iter().find(|(_, pt)| *pt == portuguese).map(|(en, _)| *en)
}

/// A stored rank shown in `language`; unknown ranks are kept as given
pub fn display_rank(stored: &str, language: Language) -> &str {
    match language {
        Language::Portuguese => stored,
        Language::English => english_rank(stored).unwrap_or(stored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_both_ways() {
        assert_eq!(portuguese_rank("Genus"), Some("Gênero"));
        assert_eq!(english_rank("Gênero"), Some("Genus"));
        assert_eq!(portuguese_rank("Division"), Some("Filo"));
        assert_eq!(english_rank("Filo"), Some("Phylum"));
        assert_eq!(portuguese_rank("Forma"), None);
    }

    #[test]
    fn test_display_rank() {
        assert_eq!(display_rank("Família", Language::English), "Family");
        assert_eq!(display_rank("Família", Language::Portuguese), "Família");
        assert_eq!(display_rank("Forma", Language::English), "Forma");
    }
}
