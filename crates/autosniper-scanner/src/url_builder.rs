use crate::normalize::fold_case;
use autosniper_core::SearchCriteria;

/// Province name → licence-plate code, the source's city parameter.
const PLATE_CODES: &[(&str, u8)] = &[
    ("adana", 1), ("adıyaman", 2), ("afyonkarahisar", 3), ("ağrı", 4), ("amasya", 5),
    ("ankara", 6), ("antalya", 7), ("artvin", 8), ("aydın", 9), ("balıkesir", 10),
    ("bilecik", 11), ("bingöl", 12), ("bitlis", 13), ("bolu", 14), ("burdur", 15),
    ("bursa", 16), ("çanakkale", 17), ("çankırı", 18), ("çorum", 19), ("denizli", 20),
    ("diyarbakır", 21), ("edirne", 22), ("elazığ", 23), ("erzincan", 24), ("erzurum", 25),
    ("eskişehir", 26), ("gaziantep", 27), ("giresun", 28), ("gümüşhane", 29), ("hakkari", 30),
    ("hatay", 31), ("ısparta", 32), ("mersin", 33), ("istanbul", 34), ("izmir", 35),
    ("kars", 36), ("kastamonu", 37), ("kayseri", 38), ("kırklareli", 39), ("kırşehir", 40),
    ("kocaeli", 41), ("konya", 42), ("kütahya", 43), ("malatya", 44), ("manisa", 45),
    ("kahramanmaraş", 46), ("mardin", 47), ("muğla", 48), ("muş", 49), ("nevşehir", 50),
    ("niğde", 51), ("ordu", 52), ("rize", 53), ("sakarya", 54), ("samsun", 55),
    ("siirt", 56), ("sinop", 57), ("sivas", 58), ("tekirdağ", 59), ("tokat", 60),
    ("trabzon", 61), ("tunceli", 62), ("şanlıurfa", 63), ("uşak", 64), ("van", 65),
    ("yozgat", 66), ("zonguldak", 67), ("aksaray", 68), ("bayburt", 69), ("karaman", 70),
    ("kırıkkale", 71), ("batman", 72), ("şırnak", 73), ("bartın", 74), ("ardahan", 75),
    ("iğdır", 76), ("yalova", 77), ("karabük", 78), ("kilis", 79), ("osmaniye", 80),
    ("düzce", 81),
];

const FUEL_CODES: &[(&str, u8)] = &[
    ("benzin", 1),
    ("dizel", 2),
    ("lpg", 3),
    ("hibrit", 4),
    ("elektrik", 6),
];

const GEAR_CODES: &[(&str, u8)] = &[("manuel", 1), ("otomatik", 2), ("yarı otomatik", 3)];

fn code_for(table: &[(&str, u8)], value: &str) -> Option<u8> {
    let wanted = fold_case(value.trim());
    table
        .iter()
        .find(|(name, _)| fold_case(name) == wanted)
        .map(|(_, code)| *code)
}

fn slug(value: &str) -> String {
    value.trim().to_lowercase().replace(' ', "-")
}

/// Plate code for a province name, tolerant of Turkish I variants.
#[must_use]
pub fn plate_code(city: &str) -> Option<u8> {
    code_for(PLATE_CODES, city)
}

/// Build the newest-first results URL for `criteria`.
///
/// Brand and model become path segments; everything else is a query
/// parameter. Values the source has no code for are left out.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn build_search_url(base_url: &str, criteria: &SearchCriteria) -> String {
    let criteria = criteria.clone().normalized();
    let base = base_url.trim_end_matches('/');

    let path = match (criteria.brand.as_deref(), criteria.model.as_deref()) {
        (Some(brand), Some(model)) => format!("/ikinci-el/{}-{}", slug(brand), slug(model)),
        (Some(brand), None) => format!("/ikinci-el/{}", slug(brand)),
        _ => "/ikinci-el".to_string(),
    };

    let mut params = vec!["sort=1".to_string()];
    if let Some(year) = criteria.min_year {
        params.push(format!("minYear={year}"));
    }
    if let Some(year) = criteria.max_year {
        params.push(format!("maxYear={year}"));
    }
    if let Some(price) = criteria.min_price {
        params.push(format!("minPrice={}", price.trunc() as i64));
    }
    if let Some(price) = criteria.max_price {
        params.push(format!("maxPrice={}", price.trunc() as i64));
    }
    if let Some(code) = criteria.city.as_deref().and_then(plate_code) {
        params.push(format!("city={code}"));
    }
    if let Some(code) = criteria
        .fuel_type
        .as_deref()
        .and_then(|fuel| code_for(FUEL_CODES, fuel))
    {
        params.push(format!("fuel={code}"));
    }
    if let Some(code) = criteria
        .transmission
        .as_deref()
        .and_then(|gear| code_for(GEAR_CODES, gear))
    {
        params.push(format!("gear={code}"));
    }

    format!("{base}{path}?{}", params.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.arabam.com";

    #[test]
    fn test_empty_criteria() {
        assert_eq!(
            build_search_url(BASE, &SearchCriteria::default()),
            "https://www.arabam.com/ikinci-el?sort=1"
        );
    }

    #[test]
    fn test_brand_model_path_and_params() {
        let criteria = SearchCriteria {
            brand: Some("Land Rover".to_string()),
            model: Some("Range Rover Evoque".to_string()),
            min_year: Some(2015),
            max_price: Some(2_500_000.0),
            fuel_type: Some("Dizel".to_string()),
            transmission: Some("Otomatik".to_string()),
            ..SearchCriteria::default()
        };
        assert_eq!(
            build_search_url(BASE, &criteria),
            "https://www.arabam.com/ikinci-el/land-rover-range-rover-evoque?sort=1&minYear=2015&maxPrice=2500000&fuel=2&gear=2"
        );
    }

    #[test]
    fn test_model_without_brand_is_ignored() {
        let criteria = SearchCriteria {
            model: Some("A4".to_string()),
            ..SearchCriteria::default()
        };
        assert_eq!(
            build_search_url(BASE, &criteria),
            "https://www.arabam.com/ikinci-el?sort=1"
        );
    }

    #[test]
    fn test_city_codes() {
        assert_eq!(plate_code("İstanbul"), Some(34));
        assert_eq!(plate_code("ISTANBUL"), Some(34));
        assert_eq!(plate_code("Isparta"), Some(32));
        assert_eq!(plate_code("Düzce"), Some(81));
        assert_eq!(plate_code("Atlantis"), None);

        let criteria = SearchCriteria {
            city: Some("izmir".to_string()),
            ..SearchCriteria::default()
        };
        assert!(build_search_url(BASE, &criteria).ends_with("&city=35"));
    }

    #[test]
    fn test_unknown_codes_are_omitted() {
        let criteria = SearchCriteria {
            city: Some("Atlantis".to_string()),
            fuel_type: Some("buhar".to_string()),
            transmission: Some("yarı otomatik".to_string()),
            ..SearchCriteria::default()
        };
        assert_eq!(
            build_search_url(BASE, &criteria),
            "https://www.arabam.com/ikinci-el?sort=1&gear=3"
        );
    }
}
