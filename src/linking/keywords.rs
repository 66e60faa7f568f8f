//! Curated domain lists for the keyword and causal-pattern scorers.
//!
//! Matching is case-folded substring containment, so stems ("contamin",
//! "erod") cover their inflections.

/// Environmental keywords. A keyword counts when it appears in both texts.
pub const ENVIRONMENTAL_KEYWORDS: &[&str] = &[
    "water",
    "marine",
    "coastal",
    "sediment",
    "nutrient",
    "oil",
    "chemical",
    "waste",
    "pollut",
    "contamin",
    "toxic",
    "habitat",
    "species",
    "fish",
    "biodiversity",
    "ecosystem",
    "erosion",
    "flood",
    "climate",
    "temperature",
    "emission",
    "noise",
    "litter",
    "plastic",
    "oxygen",
    "algal",
    "discharge",
    "runoff",
    "dredg",
    "shipping",
    "fishing",
    "agricultur",
    "industrial",
    "urban",
    "tourism",
    "mining",
    "spill",
    "invasive",
];

/// (cause phrases, effect phrases). A pair fires when the source contains any
/// cause phrase and the target contains any of its effect phrases.
pub const CAUSAL_PATTERNS: &[(&[&str], &[&str])] = &[
    (
        &["nutrient", "fertili", "sewage", "agricultur", "runoff"],
        &["eutrophication", "algal", "bloom", "hypoxia", "oxygen depletion"],
    ),
    (
        &["oil", "spill", "shipping", "tanker"],
        &["pollution", "contamination", "slick", "oiled", "fish kill"],
    ),
    (
        &["dredg", "trawl", "reclamation", "construction", "mining"],
        &["habitat loss", "habitat", "sediment", "turbidity", "smothering", "seabed"],
    ),
    (
        &["chemical", "industrial", "discharge", "effluent", "pesticide"],
        &["contamination", "toxic", "bioaccumulation", "pollution", "poisoning"],
    ),
    (
        &["overfishing", "fishing", "bycatch", "harvest"],
        &["stock decline", "depletion", "collapse", "biodiversity loss"],
    ),
    (
        &["ballast", "aquaculture", "introduction", "shipping"],
        &["invasive", "non-indigenous", "alien species"],
    ),
    (
        &["emission", "greenhouse", "combustion", "fossil"],
        &["warming", "acidification", "climate change", "sea level"],
    ),
    (
        &["litter", "plastic", "waste", "debris"],
        &["entanglement", "ingestion", "microplastic", "marine litter"],
    ),
    (
        &["deforestation", "erosion", "land clearing", "urbani"],
        &["sedimentation", "siltation", "flooding", "turbidity"],
    ),
    (
        &["noise", "sonar", "piling", "seismic"],
        &["disturbance", "displacement", "hearing damage", "stranding"],
    ),
    (
        &["pollution", "contamination", "eutrophication"],
        &["fish kill", "health", "closure", "loss", "decline", "mortality"],
    ),
    (
        &["monitoring", "regulation", "permit", "treatment", "barrier"],
        &["reduced", "prevention", "recovery", "restoration"],
    ),
];
