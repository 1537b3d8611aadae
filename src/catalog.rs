use crate::board::Placeable;
use serde::{Deserialize, Serialize};

/// Which screen family a session belongs to. Thresholds and default buckets
/// hang off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Member,
    Setlist,
    Video,
    Ramadan,
    Song,
}

impl ContentType {
    pub fn parse(s: &str) -> Option<ContentType> {
        match s {
            "member" => Some(ContentType::Member),
            "setlist" => Some(ContentType::Setlist),
            "video" => Some(ContentType::Video),
            "ramadan" => Some(ContentType::Ramadan),
            "song" => Some(ContentType::Song),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Member => "member",
            ContentType::Setlist => "setlist",
            ContentType::Video => "video",
            ContentType::Ramadan => "ramadan",
            ContentType::Song => "song",
        }
    }

    /// Net pool-size changes before an autosave fires.
    pub fn autosave_threshold(&self) -> u32 {
        match self {
            ContentType::Member | ContentType::Video | ContentType::Ramadan => 5,
            ContentType::Song | ContentType::Setlist => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Image { generation: Option<String> },
    Song { set: String },
}

/// One placeable thing, rebuilt fresh every session from the static lists
/// below. The id is a slug of the source filename / song key and never changes
/// within a session; only bucket assignments get persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceItem {
    pub id: String,
    pub display_name: String,
    pub kind: ItemKind,
}

impl Placeable for SourceItem {
    fn id(&self) -> &str {
        &self.id
    }
    fn display_label(&self) -> &str {
        &self.display_name
    }
}

// (source file stem, display name) per generation.
const MEMBERS: &[(&str, &[(&str, &str)])] = &[
    (
        "gen10",
        &[
            ("gen10-citra-dewi.jpg", "Gen10 Citra Dewi"),
            ("gen10-laras-puspita.jpg", "Gen10 Laras Puspita"),
            ("gen10-maya-anjani.jpg", "Gen10 Maya Anjani"),
            ("gen10-nadia-rahma.jpg", "Gen10 Nadia Rahma"),
            ("gen10-putri-lestari.jpg", "Gen10 Putri Lestari"),
            ("gen10-sari-wulandari.jpg", "Gen10 Sari Wulandari"),
        ],
    ),
    (
        "gen11",
        &[
            ("gen11-alya-amanda.jpg", "Gen11 Alya Amanda"),
            ("gen11-bella-safira.jpg", "Gen11 Bella Safira"),
            ("gen11-dina-maharani.jpg", "Gen11 Dina Maharani"),
            ("gen11-intan-permata.jpg", "Gen11 Intan Permata"),
            ("gen11-rara-savitri.jpg", "Gen11 Rara Savitri"),
            ("gen11-tiara-salsabila.jpg", "Gen11 Tiara Salsabila"),
        ],
    ),
    (
        "gen12",
        &[
            ("gen12-ayu-kinanti.jpg", "Gen12 Ayu Kinanti"),
            ("gen12-fiona-larasati.jpg", "Gen12 Fiona Larasati"),
            ("gen12-kirana-jasmine.jpg", "Gen12 Kirana Jasmine"),
            ("gen12-mutia-ramadhani.jpg", "Gen12 Mutia Ramadhani"),
            ("gen12-salsa-aprilia.jpg", "Gen12 Salsa Aprilia"),
            ("gen12-zahra-nabila.jpg", "Gen12 Zahra Nabila"),
        ],
    ),
];

// Ramadan-edition photo set. Same members can appear; the ids differ because
// the source files differ.
const RAMADAN_ITEMS: &[(&str, &str)] = &[
    ("ramadan-alya-amanda.jpg", "Ramadan Alya Amanda"),
    ("ramadan-citra-dewi.jpg", "Ramadan Citra Dewi"),
    ("ramadan-intan-permata.jpg", "Ramadan Intan Permata"),
    ("ramadan-kirana-jasmine.jpg", "Ramadan Kirana Jasmine"),
    ("ramadan-maya-anjani.jpg", "Ramadan Maya Anjani"),
    ("ramadan-rara-savitri.jpg", "Ramadan Rara Savitri"),
    ("ramadan-zahra-nabila.jpg", "Ramadan Zahra Nabila"),
];

// (video type, entries)
const VIDEOS: &[(&str, &[(&str, &str)])] = &[
    (
        "mv",
        &[
            ("mv-pesta-cahaya.mp4", "MV Pesta Cahaya"),
            ("mv-langit-senja.mp4", "MV Langit Senja"),
            ("mv-melodi-pertama.mp4", "MV Melodi Pertama"),
            ("mv-hujan-bintang.mp4", "MV Hujan Bintang"),
            ("mv-janji-musim-semi.mp4", "MV Janji Musim Semi"),
        ],
    ),
    (
        "performance",
        &[
            ("perf-anniversary-medley.mp4", "Anniversary Medley"),
            ("perf-akustik-session.mp4", "Akustik Session"),
            ("perf-gala-opening.mp4", "Gala Opening"),
            ("perf-summer-stage.mp4", "Summer Stage"),
        ],
    ),
];

// (song-set key, entries keyed by song key)
const SONG_SETS: &[(&str, &[(&str, &str)])] = &[
    (
        "theater-classics",
        &[
            ("pesta-cahaya", "Pesta Cahaya"),
            ("langit-senja", "Langit Senja"),
            ("dua-detik", "Dua Detik"),
            ("kota-kembang", "Kota Kembang"),
            ("melodi-pertama", "Melodi Pertama"),
            ("sahabat-panggung", "Sahabat Panggung"),
        ],
    ),
    (
        "single-collection",
        &[
            ("hujan-bintang", "Hujan Bintang"),
            ("janji-musim-semi", "Janji Musim Semi"),
            ("lari-ke-pantai", "Lari ke Pantai"),
            ("senandung-fajar", "Senandung Fajar"),
            ("tanda-tanya", "Tanda Tanya"),
        ],
    ),
];

fn slug(source: &str) -> String {
    let stem = source.rsplit_once('.').map_or(source, |(s, _)| s);
    let mut out = String::with_capacity(stem.len());
    let mut dash = false;
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

fn image_items(entries: &[(&str, &str)], generation: Option<&str>) -> Vec<SourceItem> {
    entries
        .iter()
        .map(|(file, name)| SourceItem {
            id: slug(file),
            display_name: name.to_string(),
            kind: ItemKind::Image {
                generation: generation.map(str::to_string),
            },
        })
        .collect()
}

/// Build the session's item list in source order. `sub_key` narrows members to
/// a generation, videos to a video type, songs/setlists to a song set; `None`
/// means everything of that content type. Unknown sub-selections are an error
/// so the selection screen hears about its own typos.
pub fn items_for(content_type: ContentType, sub_key: Option<&str>) -> anyhow::Result<Vec<SourceItem>> {
    match content_type {
        ContentType::Member => match sub_key {
            None => Ok(MEMBERS
                .iter()
                .flat_map(|(gen, entries)| image_items(entries, Some(*gen)))
                .collect()),
            Some(gen) => {
                let found = MEMBERS.iter().find(|(g, _)| *g == gen);
                match found {
                    Some((g, entries)) => Ok(image_items(entries, Some(*g))),
                    None => anyhow::bail!("unknown generation: {gen}"),
                }
            }
        },
        ContentType::Ramadan => Ok(image_items(RAMADAN_ITEMS, None)),
        ContentType::Video => match sub_key {
            None => Ok(VIDEOS
                .iter()
                .flat_map(|(_, entries)| image_items(entries, None))
                .collect()),
            Some(kind) => {
                let found = VIDEOS.iter().find(|(k, _)| *k == kind);
                match found {
                    Some((_, entries)) => Ok(image_items(entries, None)),
                    None => anyhow::bail!("unknown video type: {kind}"),
                }
            }
        },
        ContentType::Song | ContentType::Setlist => match sub_key {
            None => Ok(SONG_SETS
                .iter()
                .flat_map(|(set, entries)| song_items(set, entries))
                .collect()),
            Some(set) => {
                let found = SONG_SETS.iter().find(|(k, _)| *k == set);
                match found {
                    Some((k, entries)) => Ok(song_items(k, entries)),
                    None => anyhow::bail!("unknown song set: {set}"),
                }
            }
        },
    }
}

fn song_items(set: &str, entries: &[(&str, &str)]) -> Vec<SourceItem> {
    entries
        .iter()
        .map(|(key, name)| SourceItem {
            id: slug(key),
            display_name: name.to_string(),
            kind: ItemKind::Song {
                set: set.to_string(),
            },
        })
        .collect()
}

/// Names of the available sub-selections, for the upstream selection screen.
pub fn sub_keys_for(content_type: ContentType) -> Vec<&'static str> {
    match content_type {
        ContentType::Member => MEMBERS.iter().map(|(g, _)| *g).collect(),
        ContentType::Video => VIDEOS.iter().map(|(k, _)| *k).collect(),
        ContentType::Song | ContentType::Setlist => {
            SONG_SETS.iter().map(|(k, _)| *k).collect()
        }
        ContentType::Ramadan => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_drop_extension_and_flatten_separators() {
        assert_eq!(slug("gen11-alya-amanda.jpg"), "gen11-alya-amanda");
        assert_eq!(slug("MV Pesta  Cahaya.mp4"), "mv-pesta-cahaya");
        assert_eq!(slug("dua-detik"), "dua-detik");
    }

    #[test]
    fn member_sub_key_filters_one_generation() {
        let all = items_for(ContentType::Member, None).expect("all members");
        let gen11 = items_for(ContentType::Member, Some("gen11")).expect("gen11");
        assert_eq!(gen11.len(), 6);
        assert!(gen11.len() < all.len());
        assert!(gen11.iter().all(|i| i.id.starts_with("gen11-")));
        assert!(items_for(ContentType::Member, Some("gen99")).is_err());
    }

    #[test]
    fn song_ids_are_stable_per_set() {
        let set = items_for(ContentType::Song, Some("theater-classics")).expect("set");
        assert_eq!(set[0].id, "pesta-cahaya");
        assert!(matches!(
            &set[0].kind,
            ItemKind::Song { set } if set == "theater-classics"
        ));
    }

    #[test]
    fn ids_are_unique_within_a_session_list() {
        for ct in [
            ContentType::Member,
            ContentType::Setlist,
            ContentType::Video,
            ContentType::Ramadan,
            ContentType::Song,
        ] {
            let items = items_for(ct, None).expect("items");
            let mut ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), items.len(), "{:?}", ct);
        }
    }
}
