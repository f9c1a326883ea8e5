//! Text normalization for scraped listing fragments.
//!
//! Everything here is pure and tolerant: unparseable input yields `0.0` or
//! `None`, never an error.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Prices at or below this are treated as noise (installments, fees).
pub const MIN_PLAUSIBLE_PRICE: f64 = 10_000.0;

/// Oldest and newest model years accepted from free text.
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1980..=2025;

const BRANDS: &[&str] = &[
    "Audi", "BMW", "Mercedes", "Volkswagen", "Ford", "Opel", "Renault", "Peugeot", "Fiat",
    "Toyota", "Honda", "Hyundai", "Volvo", "Skoda", "Seat", "Citroen", "Dacia", "Nissan", "Kia",
    "Mazda", "Mitsubishi", "Suzuki", "Chevrolet", "Jeep",
];

const CITIES: &[&str] = &[
    "İstanbul", "Ankara", "İzmir", "Bursa", "Antalya", "Adana", "Gaziantep", "Konya", "Kayseri",
    "Mersin", "Eskişehir", "Samsun", "Tekirdağ", "Kastamonu", "Denizli", "Manisa", "Kocaeli",
    "Sakarya", "Trabzon", "Diyarbakır", "Şanlıurfa", "Malatya", "Erzurum", "Aydın", "Balıkesir",
    "Hatay", "Van", "Kahramanmaraş", "Ordu", "Afyonkarahisar", "Muğla", "Elazığ", "Mardin",
    "Aksaray", "Edirne", "Çanakkale", "Zonguldak", "Tokat", "Kırıkkale", "Çorum", "Sivas",
    "Yozgat",
];

// Checked in order; the first family with a hit wins.
const FUEL_TYPES: &[(&str, &[&str])] = &[
    ("dizel", &["dizel", "diesel"]),
    ("benzin", &["benzin", "petrol"]),
    ("elektrik", &["elektrik", "electric"]),
    ("hibrit", &["hibrit", "hybrid"]),
    ("lpg", &["lpg"]),
];

const TRANSMISSIONS: &[(&str, &[&str])] = &[
    ("otomatik", &["otomatik", "automatic"]),
    ("manuel", &["manuel", "manual", "düz vites"]),
];

const IMAGE_HOST_MARKERS: &[&str] = &["arbstorage", "mncdn", "ilanfoto", "cdn"];
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];
const IMAGE_REJECT_MARKERS: &[&str] = &["placeholder", "icon", "logo", "1x1", "spinner"];

const SLUG_FILLER: &[&str] = &[
    "galeriden", "sahibinden", "satilik", "kiralik", "takas", "model", "detay",
];
const SLUG_CITIES: &[&str] = &[
    "istanbul", "ankara", "izmir", "bursa", "adana", "antalya", "konya", "gaziantep", "kayseri",
    "mersin", "eskisehir", "diyarbakir", "samsun", "denizli", "sanliurfa", "malatya", "trabzon",
    "erzurum",
];
const SLUG_MAX_WORDS: usize = 7;

static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(19[89]\d|20[0-2]\d)\b").expect("valid year regex"));
static SLUG_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(19|20)\d{2}$").expect("valid slug year regex"));
static PRICE_TEXT_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(\d{1,3}(?:\.\d{3}){2,})\s*(?:TL|₺)",
        r"(?i)(\d{1,3}(?:,\d{3}){2,})\s*(?:TL|₺)",
        r"(?i)(\d{6,})\s*(?:TL|₺)",
        r"(?i)(?:TL|₺)\s*(\d{1,3}(?:\.\d{3}){2,})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid price regex"))
    .collect()
});
static DOTTED_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,3}(?:\.\d{3})+").expect("valid dotted number regex"));

/// Lower-case `text`, folding the Turkish dotted and dotless I onto `i`.
#[must_use]
pub fn fold_case(text: &str) -> String {
    text.replace('İ', "i").replace('ı', "i").to_lowercase()
}

/// Parse a price string such as `1.500.000 TL`, `1,500,000 ₺` or `850000`.
///
/// A separator is a thousands separator when it repeats or when it is
/// followed by exactly three digits; a single comma otherwise is a decimal
/// point. Returns `0.0` when nothing numeric remains.
#[must_use]
pub fn parse_price(text: &str) -> f64 {
    let cleaned = text.replace("TL", "").replace("tl", "").replace('₺', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return 0.0;
    }

    let group_of_three =
        |sep: char| cleaned.rsplit(sep).next().is_some_and(|tail| tail.chars().count() == 3);
    let dots = cleaned.matches('.').count();
    let commas = cleaned.matches(',').count();

    let unified = if dots >= 2 || (dots == 1 && group_of_three('.')) {
        cleaned.replace('.', "")
    } else if commas >= 2 || (commas == 1 && group_of_three(',')) {
        cleaned.replace(',', "")
    } else if commas == 1 {
        cleaned.replace(',', ".")
    } else {
        cleaned.to_string()
    };

    let numeric: String = unified
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    numeric.parse().unwrap_or(0.0)
}

/// Find a plausible price anywhere in a block of text.
///
/// Currency-marked amounts are tried first; as a last resort any dotted
/// number between 50 000 and 50 000 000 is accepted.
#[must_use]
pub fn extract_price_from_text(text: &str) -> f64 {
    for re in PRICE_TEXT_RES.iter() {
        if let Some(price) = re
            .captures_iter(text)
            .map(|caps| parse_price(&caps[1]))
            .find(|price| *price > MIN_PLAUSIBLE_PRICE)
        {
            return price;
        }
    }

    DOTTED_NUMBER_RE
        .find_iter(text)
        .map(|m| parse_price(m.as_str()))
        .find(|price| *price > 50_000.0 && *price < 50_000_000.0)
        .unwrap_or(0.0)
}

/// First plausible model year in `text`.
#[must_use]
pub fn extract_year(text: &str) -> Option<i32> {
    YEAR_RE
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<i32>().ok())
        .find(|year| YEAR_RANGE.contains(year))
}

fn lookup(table: &[&str], text: &str) -> Option<String> {
    let folded = fold_case(text);
    table
        .iter()
        .find(|known| folded.contains(&fold_case(known)))
        .map(|known| (*known).to_string())
}

fn lookup_family(table: &[(&str, &[&str])], text: &str) -> Option<String> {
    let folded = fold_case(text);
    table
        .iter()
        .find(|(_, words)| words.iter().any(|w| folded.contains(w)))
        .map(|(canonical, _)| (*canonical).to_string())
}

/// Known brand mentioned in `text`.
#[must_use]
pub fn extract_brand(text: &str) -> Option<String> {
    lookup(BRANDS, text)
}

/// Known city mentioned in `text`.
#[must_use]
pub fn extract_city(text: &str) -> Option<String> {
    lookup(CITIES, text)
}

/// Canonical fuel type (`dizel`, `benzin`, ...) mentioned in `text`.
#[must_use]
pub fn extract_fuel_type(text: &str) -> Option<String> {
    lookup_family(FUEL_TYPES, text)
}

/// Canonical transmission (`otomatik`, `manuel`) mentioned in `text`.
#[must_use]
pub fn extract_transmission(text: &str) -> Option<String> {
    lookup_family(TRANSMISSIONS, text)
}

/// Whether `src` looks like a real vehicle photo.
#[must_use]
pub fn is_valid_image(src: &str) -> bool {
    let lower = src.to_lowercase();
    if lower.is_empty() || IMAGE_REJECT_MARKERS.iter().any(|bad| lower.contains(bad)) {
        return false;
    }
    IMAGE_HOST_MARKERS.iter().any(|m| lower.contains(m))
        || IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext))
}

/// Resolve `href` against the source base URL.
#[must_use]
pub fn resolve_url(base_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match Url::parse(href) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(_) => Url::parse(base_url)
            .and_then(|base| base.join(href))
            .ok()
            .map(|u| u.to_string()),
    }
}

/// Derive a readable title from a listing URL slug.
///
/// `/ilan/galeriden-satilik-renault/galeriden-renault-symbol-1-5-dci-joy-2018-model-bursa/33861099`
/// becomes `Renault Symbol Dci Joy`.
#[must_use]
pub fn title_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let Some(slug) = path
        .split('/')
        .filter(|part| !part.is_empty() && !part.chars().all(|c| c.is_ascii_digit()))
        .filter(|part| *part != "ilan" && !part.contains(':') && !part.contains('.'))
        .last()
    else {
        return String::new();
    };

    let mut words: Vec<String> = Vec::new();
    for word in slug.split('-') {
        let lower = word.to_lowercase();
        if word.chars().count() < 2
            || SLUG_CITIES.contains(&lower.as_str())
            || SLUG_FILLER.contains(&lower.as_str())
            || SLUG_YEAR_RE.is_match(word)
        {
            continue;
        }
        if words.last().is_some_and(|prev| prev.to_lowercase() == lower) {
            continue;
        }
        words.push(capitalize(&lower));
    }

    words.truncate(SLUG_MAX_WORDS);
    words.join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Truncate to at most `max` characters.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
