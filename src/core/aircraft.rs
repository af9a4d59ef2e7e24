use crate::domain::model::AcClass;
use regex::Regex;
use std::sync::LazyLock;

/// Ordered classification rules, most specific first: exact model numbers
/// before generic brand names. The first match wins.
static RULES: LazyLock<Vec<(Regex, AcClass)>> = LazyLock::new(|| {
    let rule = |pattern: &str, class: AcClass| (Regex::new(pattern).unwrap(), class);
    vec![
        // Explicit class words in the descriptor itself.
        rule(r"ULTRA[- ]?LONG|\bULR\b|LONG[- ]?RANGE", AcClass::Heavy),
        rule(r"SUPER[- ]?MID", AcClass::SuperMidsize),
        rule(r"LARGE[- ]?CABIN|HEAVY", AcClass::Heavy),
        rule(r"\bMID(SIZE)?\b", AcClass::Midsize),
        rule(r"\bLIGHT\b|VERY LIGHT", AcClass::Light),
        rule(r"TURBO[- ]?PROP", AcClass::Turboprop),
        // Exact models.
        rule(r"G650|G600|G550|G500|\bGV\b|G[- ]?IV\b|\bGIV\b|G450|G400", AcClass::Heavy),
        rule(r"GLOBAL ?(5|6|7)\d{3}|GLOBAL EXPRESS", AcClass::Heavy),
        rule(r"FALCON ?(7X|8X|900)", AcClass::Heavy),
        rule(r"CHALLENGER ?(601|604|605|650)", AcClass::Heavy),
        rule(r"LEGACY ?(600|650)", AcClass::Heavy),
        rule(
            r"CHALLENGER ?(300|350|3500)|FALCON ?2000|G280|CITATION ?LONGITUDE|LONGITUDE|CITATION ?X\b",
            AcClass::SuperMidsize,
        ),
        rule(
            r"HAWKER ?(800|850|900)|CITATION ?(XLS\+?|SOVEREIGN|LATITUDE)|\bXLS\b|LEAR(JET)? ?(45|60)|PRAETOR ?500|LEGACY ?450",
            AcClass::Midsize,
        ),
        rule(
            r"CITATION ?(CJ[1-4]\+?|M2|MUSTANG)|\bCJ[1-4]\+?\b|PHENOM ?(100|300)|LEAR(JET)? ?(31|35|40)|HONDAJET|VISION ?JET",
            AcClass::Light,
        ),
        rule(r"KING ?AIR|PC-?12|PILATUS|TBM ?\d{3}|CARAVAN", AcClass::Turboprop),
        // Generic brand fallbacks.
        rule(r"GULFSTREAM|GLOBAL|FALCON|CHALLENGER", AcClass::Heavy),
        rule(r"CITATION|LEAR|HAWKER|PRAETOR|LEGACY", AcClass::Midsize),
        rule(r"PHENOM", AcClass::Light),
    ]
});

/// Classify a free-text aircraft descriptor into the fixed taxonomy.
/// No match is never an error; it maps to `Unknown`.
pub fn classify(descriptor: Option<&str>) -> AcClass {
    let Some(descriptor) = descriptor else {
        return AcClass::Unknown;
    };
    let s = descriptor.trim().to_uppercase().replace('_', "-");
    if s.is_empty() {
        return AcClass::Unknown;
    }
    for (re, class) in RULES.iter() {
        if re.is_match(&s) {
            return *class;
        }
    }
    AcClass::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_models_beat_brand_names() {
        // "Challenger" alone is heavy-ish, but Challenger 300 is super-mid.
        assert_eq!(classify(Some("Challenger 350")), AcClass::SuperMidsize);
        assert_eq!(classify(Some("Challenger 650")), AcClass::Heavy);
        assert_eq!(classify(Some("Challenger")), AcClass::Heavy);
    }

    #[test]
    fn test_model_buckets() {
        assert_eq!(classify(Some("Gulfstream G650ER")), AcClass::Heavy);
        assert_eq!(classify(Some("Global 6000")), AcClass::Heavy);
        assert_eq!(classify(Some("Falcon 2000LXS")), AcClass::SuperMidsize);
        assert_eq!(classify(Some("Citation XLS+")), AcClass::Midsize);
        assert_eq!(classify(Some("Hawker 800XP")), AcClass::Midsize);
        assert_eq!(classify(Some("Citation CJ3+")), AcClass::Light);
        assert_eq!(classify(Some("Phenom 300E")), AcClass::Light);
        assert_eq!(classify(Some("King Air 350i")), AcClass::Turboprop);
        assert_eq!(classify(Some("PC-12 NGX")), AcClass::Turboprop);
    }

    #[test]
    fn test_class_words() {
        assert_eq!(classify(Some("super midsize jet")), AcClass::SuperMidsize);
        assert_eq!(classify(Some("Light Jet")), AcClass::Light);
        assert_eq!(classify(Some("ultra-long range")), AcClass::Heavy);
        assert_eq!(classify(Some("turboprop")), AcClass::Turboprop);
    }

    #[test]
    fn test_no_match_is_unknown() {
        assert_eq!(classify(None), AcClass::Unknown);
        assert_eq!(classify(Some("")), AcClass::Unknown);
        assert_eq!(classify(Some("Boeing 737 BBJ?")), AcClass::Unknown);
    }
}
