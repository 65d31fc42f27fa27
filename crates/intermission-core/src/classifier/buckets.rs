//! Static descriptor bucket table
//!
//! Each bucket owns seed tokens (Tier 1 tag matching), fallback words (Tier 2
//! free-text matching, phrases allowed) and negative tokens that cancel naive
//! keyword collisions such as "star wars" or "crime fighting".

/// One descriptor category
#[derive(Debug, Clone, Copy)]
pub struct BucketDef {
    pub key: &'static str,
    /// Display label used when the label dictionary has no entry
    pub label: &'static str,
    pub seeds: &'static [&'static str],
    pub fallback_words: &'static [&'static str],
    pub negatives: &'static [&'static str],
}

/// Tie-break order, mature/serious categories first
pub const PRIORITY: &[&str] = &[
    "war",
    "crime",
    "violence",
    "horror",
    "sexual",
    "drugs",
    "mature",
    "thriller",
    "mystery",
    "action",
    "scifi",
    "fantasy",
    "history",
    "biography",
    "sports",
    "music",
    "romance",
    "comedy",
    "animation",
    "family",
    "fairytale",
];

/// Penalty subtracted per negative token present
pub const NEGATIVE_PENALTY: f64 = 1.5;

/// Maximum descriptors returned for one item
pub const MAX_DESCRIPTORS: usize = 2;

pub static BUCKETS: &[BucketDef] = &[
    BucketDef {
        key: "war",
        label: "War",
        seeds: &[
            "war", "wars", "warfare", "battle", "battlefield", "soldier", "soldiers", "military",
            "army", "combat", "wwi", "wwii", "ww2", "invasion", "trench", "nazi", "holocaust",
        ],
        fallback_words: &[
            "war", "warfare", "battlefield", "soldier", "soldiers", "army", "world war",
            "front line", "invasion", "platoon", "regiment", "occupation",
        ],
        negatives: &["star", "console", "bidding", "price", "turf"],
    },
    BucketDef {
        key: "crime",
        label: "Crime",
        seeds: &[
            "crime", "criminal", "heist", "robbery", "gangster", "gang", "mafia", "mob", "cartel",
            "detective", "police", "cop", "thief", "theft", "smuggling", "kidnapping", "yakuza",
            "corruption", "prison", "heists",
        ],
        fallback_words: &[
            "crime", "criminal", "heist", "robbery", "gangster", "mafia", "cartel", "mob boss",
            "detective", "smuggler", "kidnapping", "drug lord", "con artist", "bank job",
        ],
        negatives: &["fighting", "superhero"],
    },
    BucketDef {
        key: "violence",
        label: "Violence",
        seeds: &[
            "violence", "violent", "blood", "brutal", "brutality", "gun", "guns", "shooting",
            "shootout", "massacre", "torture", "revenge", "assassin", "murder", "killing",
            "killer",
        ],
        fallback_words: &[
            "violence", "violent", "bloody", "brutal", "massacre", "torture", "revenge",
            "assassin", "murder", "slaughter", "gunfight", "shootout",
        ],
        negatives: &["non", "nonviolent"],
    },
    BucketDef {
        key: "horror",
        label: "Horror",
        seeds: &[
            "horror", "gore", "zombie", "zombies", "vampire", "vampires", "slasher", "haunted",
            "ghost", "ghosts", "demon", "possession", "exorcism", "monster", "occult", "terror",
        ],
        fallback_words: &[
            "horror", "gore", "zombie", "vampire", "slasher", "haunted", "haunted house",
            "ghost", "demon", "possessed", "exorcism", "evil spirit", "terrifying",
        ],
        negatives: &["parody", "spoof"],
    },
    BucketDef {
        key: "sexual",
        label: "Sexual content",
        seeds: &[
            "sex", "sexual", "sexuality", "nudity", "erotic", "erotica", "seduction",
            "prostitution", "prostitute", "stripper",
        ],
        fallback_words: &[
            "sex", "sexual", "nudity", "erotic", "seduction", "prostitute", "one night stand",
        ],
        negatives: &["education"],
    },
    BucketDef {
        key: "drugs",
        label: "Substance use",
        seeds: &[
            "drug", "drugs", "addiction", "cocaine", "heroin", "alcohol", "alcoholism",
            "alcoholic", "overdose", "narcotics", "meth", "marijuana",
        ],
        fallback_words: &[
            "drug", "drugs", "addiction", "addict", "cocaine", "heroin", "alcoholic",
            "overdose", "narcotics", "drug dealer",
        ],
        negatives: &["prescription"],
    },
    BucketDef {
        key: "mature",
        label: "Mature themes",
        seeds: &[
            "suicide", "abuse", "depression", "trauma", "grief", "terminal", "cancer", "illness",
            "dying", "euthanasia",
        ],
        fallback_words: &[
            "suicide", "abuse", "depression", "trauma", "grief", "terminal illness",
            "terminally ill", "self harm",
        ],
        negatives: &[],
    },
    BucketDef {
        key: "thriller",
        label: "Suspense",
        seeds: &[
            "thriller", "suspense", "psychological", "conspiracy", "stalker", "hostage",
            "espionage", "spy", "assassination",
        ],
        fallback_words: &[
            "thriller", "suspense", "conspiracy", "stalker", "hostage", "espionage", "spy",
            "cat and mouse", "race against time",
        ],
        negatives: &[],
    },
    BucketDef {
        key: "mystery",
        label: "Mystery",
        seeds: &["mystery", "whodunit", "investigation", "puzzle", "disappearance", "missing"],
        fallback_words: &[
            "mystery", "mysterious", "whodunit", "investigation", "disappearance",
            "vanished", "unsolved",
        ],
        negatives: &[],
    },
    BucketDef {
        key: "action",
        label: "Action",
        seeds: &["action", "explosion", "chase", "martial", "stunt", "mercenary", "superhero"],
        fallback_words: &[
            "action", "explosive", "car chase", "martial arts", "mercenary", "superhero",
            "high octane",
        ],
        negatives: &[],
    },
    BucketDef {
        key: "scifi",
        label: "Science fiction",
        seeds: &[
            "sci", "scifi", "space", "alien", "aliens", "robot", "robots", "android", "cyberpunk",
            "dystopia", "dystopian", "futuristic", "spaceship", "galaxy", "extraterrestrial",
            "cyborg",
        ],
        fallback_words: &[
            "science fiction", "sci-fi", "outer space", "alien", "robot", "cyborg",
            "dystopian", "time travel", "spaceship", "galaxy", "artificial intelligence",
        ],
        negatives: &["personal"],
    },
    BucketDef {
        key: "fantasy",
        label: "Fantasy",
        seeds: &[
            "fantasy", "magic", "magical", "wizard", "witch", "dragon", "dragons", "sorcery",
            "sword", "mythology", "myth", "elf", "elves", "quest", "kingdom",
        ],
        fallback_words: &[
            "fantasy", "magic", "wizard", "witch", "dragon", "sorcerer", "enchanted kingdom",
            "mythical", "quest",
        ],
        negatives: &["football", "sexual"],
    },
    BucketDef {
        key: "history",
        label: "Historical",
        seeds: &[
            "historical", "history", "period", "medieval", "ancient", "victorian", "century",
            "empire", "royalty",
        ],
        fallback_words: &[
            "historical", "medieval", "ancient", "victorian", "empire", "century", "dynasty",
            "19th century", "18th century",
        ],
        negatives: &["alternate"],
    },
    BucketDef {
        key: "biography",
        label: "Biographical",
        seeds: &["biography", "biopic", "biographical", "memoir", "autobiography"],
        fallback_words: &["biography", "biopic", "true story", "based on a true story", "memoir"],
        negatives: &[],
    },
    BucketDef {
        key: "sports",
        label: "Sports",
        seeds: &[
            "sport", "sports", "football", "soccer", "basketball", "baseball", "boxing", "boxer",
            "olympics", "racing", "tennis", "wrestling", "athlete",
        ],
        fallback_words: &[
            "sports", "football", "soccer", "basketball", "baseball", "boxing", "olympic",
            "championship", "athlete", "coach",
        ],
        negatives: &["fantasy"],
    },
    BucketDef {
        key: "music",
        label: "Music",
        seeds: &["music", "musical", "band", "singer", "concert", "jazz", "rock", "dance", "dancing"],
        fallback_words: &["music", "musical", "band", "singer", "concert", "songwriter", "dancer"],
        negatives: &["climbing"],
    },
    BucketDef {
        key: "romance",
        label: "Romance",
        seeds: &[
            "romance", "romantic", "love", "lovers", "wedding", "marriage", "affair", "dating",
            "heartbreak",
        ],
        fallback_words: &[
            "romance", "romantic", "love story", "falls in love", "lovers", "wedding",
            "heartbreak",
        ],
        negatives: &[],
    },
    BucketDef {
        key: "comedy",
        label: "Comedy",
        seeds: &[
            "comedy", "comedic", "humor", "humour", "funny", "parody", "satire", "spoof",
            "sitcom", "slapstick",
        ],
        fallback_words: &["comedy", "comedic", "hilarious", "funny", "parody", "satire", "spoof"],
        negatives: &[],
    },
    BucketDef {
        key: "animation",
        label: "Animation",
        seeds: &["animation", "animated", "anime", "cartoon"],
        fallback_words: &["animated", "animation", "anime", "cartoon"],
        negatives: &[],
    },
    BucketDef {
        key: "family",
        label: "Family",
        seeds: &["family", "kids", "children", "friendship", "pet", "dog", "christmas", "holiday"],
        fallback_words: &["family", "kids", "children", "friendship", "christmas", "holiday"],
        negatives: &["dysfunctional", "crime"],
    },
    BucketDef {
        key: "fairytale",
        label: "Fairy tale",
        seeds: &[
            "fairy", "fairytale", "princess", "prince", "enchanted", "folklore", "fable",
        ],
        fallback_words: &["fairy tale", "fairytale", "princess", "enchanted", "folklore", "fable"],
        negatives: &["battlefield", "war", "gore", "horror", "blood"],
    },
];

/// Look up a bucket by key
pub fn bucket(key: &str) -> Option<&'static BucketDef> {
    BUCKETS.iter().find(|bucket| bucket.key == key)
}

/// Position of `key` in `priority`; unknown keys sort last
pub fn priority_rank(priority: &[String], key: &str) -> usize {
    priority
        .iter()
        .position(|entry| entry == key)
        .unwrap_or(priority.len())
}

/// Default priority as owned strings
pub fn default_priority() -> Vec<String> {
    PRIORITY.iter().map(|key| key.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_bucket_has_a_priority() {
        for bucket in BUCKETS {
            assert!(PRIORITY.contains(&bucket.key), "{} missing from PRIORITY", bucket.key);
        }
        assert_eq!(PRIORITY.len(), BUCKETS.len());
    }

    #[test]
    fn test_bucket_keys_unique() {
        let keys: HashSet<_> = BUCKETS.iter().map(|bucket| bucket.key).collect();
        assert_eq!(keys.len(), BUCKETS.len());
    }

    #[test]
    fn test_seeds_are_single_lowercase_tokens() {
        for bucket in BUCKETS {
            for seed in bucket.seeds {
                assert!(
                    seed.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()),
                    "seed {seed:?} in {} is not a normalized token",
                    bucket.key
                );
            }
        }
    }

    #[test]
    fn test_priority_rank() {
        let priority = default_priority();
        assert!(priority_rank(&priority, "war") < priority_rank(&priority, "fairytale"));
        assert_eq!(priority_rank(&priority, "unknown"), priority.len());
    }
}
