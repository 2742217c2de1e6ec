//! Semantic zone map shared by op compilation and the simulator.
//!
//! One authoritative table of zone name to map coordinates, with the
//! Chinese aliases the HCI layer recognises.

/// Zone name, x, y.  English names first, aliases after.
const ZONES: &[(&str, f64, f64)] = &[
    ("kitchen", 2.0, 2.0),
    ("living_room", 10.0, 5.0),
    ("bedroom", 2.0, 7.0),
    ("bathroom", 7.0, 12.0),
    ("charging_station", -1.0, 1.0),
    ("厨房", 2.0, 2.0),
    ("客厅", 10.0, 5.0),
    ("卧室", 2.0, 7.0),
    ("浴室", 7.0, 12.0),
    ("洗手间", 7.0, 12.0),
    ("卫生间", 7.0, 12.0),
    ("充电站", -1.0, 1.0),
];

/// The canonical English zone names, in map order.
pub fn names() -> Vec<&'static str> {
    vec![
        "kitchen",
        "living_room",
        "bedroom",
        "bathroom",
        "charging_station",
    ]
}

/// Coordinates for a zone name or alias; case-insensitive on ASCII.
pub fn coordinates(name: &str) -> Option<(f64, f64)> {
    let needle = name.trim().to_ascii_lowercase();
    ZONES
        .iter()
        .find(|(zone, _, _)| *zone == needle)
        .map(|(_, x, y)| (*x, *y))
}

/// The zone whose reference point is nearest to `(x, y)`, within `radius`.
pub fn zone_at(x: f64, y: f64, radius: f64) -> Option<&'static str> {
    names()
        .into_iter()
        .filter_map(|zone| {
            let (zx, zy) = coordinates(zone)?;
            let d2 = (zx - x).powi(2) + (zy - y).powi(2);
            (d2 <= radius * radius).then_some((zone, d2))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(zone, _)| zone)
}
