/// Top-level administrative divisions, as they appear at the start of a
/// road-name address in the national open-data export.
pub const REGIONS: [&str; 17] = [
    "서울특별시",
    "부산광역시",
    "대구광역시",
    "인천광역시",
    "광주광역시",
    "대전광역시",
    "울산광역시",
    "세종특별자치시",
    "경기도",
    "강원도",
    "충청북도",
    "충청남도",
    "전라북도",
    "전라남도",
    "경상북도",
    "경상남도",
    "제주특별자치도",
];

/// Split an address into its region prefix and the whitespace-delimited
/// token that follows it (the city/county/district).
///
/// Best effort: an address that starts with no known region yields neither
/// part, and a region not followed by whitespace yields no sub-region.
pub fn split_region(address: &str) -> (Option<&'static str>, Option<&str>) {
    let Some(region) = REGIONS
        .iter()
        .copied()
        .filter(|r| address.starts_with(r))
        .max_by_key(|r| r.len())
    else {
        return (None, None);
    };

    let rest = &address[region.len()..];
    let sub = if rest.starts_with(char::is_whitespace) {
        rest.split_whitespace().next()
    } else {
        None
    };

    (Some(region), sub)
}
