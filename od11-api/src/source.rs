//! Input sources, their fixed aliases, and identifier resolution

use std::collections::BTreeMap;
use std::fmt;

use crate::error::UnknownSourceError;
use crate::id_types::SourceId;

/// Source id to display name, ordered by id
pub type SourceMap = BTreeMap<SourceId, String>;

/// The six inputs every OD-11 firmware exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceAlias {
    Airplay,
    Spotify,
    Playlist,
    LineIn,
    Optical,
    Bluetooth,
}

impl SourceAlias {
    pub const ALL: [SourceAlias; 6] = [
        SourceAlias::Airplay,
        SourceAlias::Spotify,
        SourceAlias::Playlist,
        SourceAlias::LineIn,
        SourceAlias::Optical,
        SourceAlias::Bluetooth,
    ];

    /// Canonical key, also the suffix of the `set_input_<key>` services
    pub fn key(&self) -> &'static str {
        match self {
            SourceAlias::Airplay => "airplay",
            SourceAlias::Spotify => "spotify",
            SourceAlias::Playlist => "playlist",
            SourceAlias::LineIn => "linein",
            SourceAlias::Optical => "optical",
            SourceAlias::Bluetooth => "bluetooth",
        }
    }

    /// Id the stock firmware assigns to this input
    pub fn canonical_id(&self) -> SourceId {
        let id = match self {
            SourceAlias::Airplay => 0,
            SourceAlias::Spotify => 1,
            SourceAlias::Playlist => 2,
            SourceAlias::LineIn => 3,
            SourceAlias::Optical => 4,
            SourceAlias::Bluetooth => 5,
        };
        SourceId::from(id)
    }

    /// Look up a canonical key (`"optical"`) or short alias (`"opt"`)
    pub fn from_key(key: &str) -> Option<Self> {
        let key = simplify(key);
        Self::ALL
            .into_iter()
            .find(|alias| alias.key() == key)
            .or_else(|| {
                SHORT_ALIASES
                    .iter()
                    .find(|(short, _)| *short == key)
                    .map(|(_, alias)| *alias)
            })
    }
}

impl fmt::Display for SourceAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Short forms accepted wherever a source can be named
pub const SHORT_ALIASES: &[(&str, SourceAlias)] = &[
    ("b", SourceAlias::Bluetooth),
    ("bt", SourceAlias::Bluetooth),
    ("blue", SourceAlias::Bluetooth),
    ("o", SourceAlias::Optical),
    ("opt", SourceAlias::Optical),
    ("l", SourceAlias::LineIn),
    ("li", SourceAlias::LineIn),
    ("line", SourceAlias::LineIn),
    ("s", SourceAlias::Spotify),
    ("sp", SourceAlias::Spotify),
    ("spot", SourceAlias::Spotify),
    ("a", SourceAlias::Airplay),
    ("ap", SourceAlias::Airplay),
    ("air", SourceAlias::Airplay),
    ("p", SourceAlias::Playlist),
    ("pl", SourceAlias::Playlist),
];

/// Lowercase and strip everything but letters and digits
///
/// `"Line In"`, `"line-in"` and `"LINEIN"` all simplify to `"linein"`.
pub fn simplify(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolve a user-supplied identifier to a source id
///
/// Tried in order, case-insensitively:
/// 1. an id present in `sources`
/// 2. a short alias, rewritten to its canonical key
/// 3. an exact (simplified) source name
/// 4. a source name starting with or containing the query
/// 5. the canonical firmware id, if `sources` lists it or is empty
/// 6. any integer id, if `sources` is empty
pub fn resolve_source(query: &str, sources: &SourceMap) -> Result<SourceId, UnknownSourceError> {
    let trimmed = query.trim();
    let simple = simplify(trimmed);
    if simple.is_empty() {
        return Err(UnknownSourceError::new(query));
    }

    if let Some(id) = sources
        .keys()
        .find(|id| id.to_string().eq_ignore_ascii_case(trimmed))
    {
        return Ok(id.clone());
    }

    let alias = SourceAlias::from_key(&simple);
    let canon = alias.map(|a| a.key().to_string()).unwrap_or(simple);

    if let Some((id, _)) = sources.iter().find(|(_, name)| simplify(name) == canon) {
        return Ok(id.clone());
    }

    if let Some((id, _)) = sources.iter().find(|(_, name)| {
        let name = simplify(name);
        name.starts_with(&canon) || name.contains(&canon)
    }) {
        return Ok(id.clone());
    }

    if let Some(alias) = alias {
        let id = alias.canonical_id();
        if sources.is_empty() || sources.contains_key(&id) {
            return Ok(id);
        }
    }

    // Without a source list there is nothing to check a numeric id against
    if sources.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let id = SourceId::from(trimmed);
        if id.as_int().is_some() {
            return Ok(id);
        }
    }

    Err(UnknownSourceError::new(query))
}
