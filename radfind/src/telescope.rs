//! Telescope site latitudes.

/// (name, latitude in degrees) for known radio observatories.
const TELESCOPE_LATITUDES: &[(&str, f64)] = &[
    ("MWA", -26.703319),
    ("ATCA", -30.3128),
    ("ASKAP", -26.697),
    ("MOST", -35.3707),
    ("PARKES", -32.999944),
    ("MEERKAT", -30.721),
    ("KAT7", -30.721),
    ("PAPER", -30.7224),
    ("SKA-LOW", -26.8247),
    ("VLA", 34.0790),
    ("LOFAR", 52.9088),
    ("WSRT", 52.914722),
    ("GMRT", 19.096517),
    ("OOTY", 11.383404),
    ("GBT", 38.433056),
    ("LWA", 34.0700),
    ("ATA", 40.817),
    ("CARMA", 37.28044),
    ("DRAO", 49.321108),
    ("CHIME", 49.3208),
    ("ALMA", -23.019283),
    ("FAST", 25.6525),
    ("EFFELSBERG", 50.524722),
];

/// Latitude of `name` in degrees, matched case-insensitively.
pub fn telescope_to_latitude(name: &str) -> Option<f64> {
    let name = name.trim();
    TELESCOPE_LATITUDES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|&(_, lat)| lat)
}

/// Every telescope name the lookup knows.
pub fn known_telescopes() -> impl Iterator<Item = &'static str> {
    TELESCOPE_LATITUDES.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(telescope_to_latitude("MWA"), Some(-26.703319));
        assert_eq!(telescope_to_latitude("mwa"), Some(-26.703319));
        assert_eq!(telescope_to_latitude(" Lofar "), Some(52.9088));
        assert_eq!(telescope_to_latitude("Arecibo"), None);
    }

    #[test]
    fn test_latitudes_are_in_range() {
        for name in known_telescopes() {
            let lat = telescope_to_latitude(name).unwrap();
            assert!((-90.0..=90.0).contains(&lat), "{name} has latitude {lat}");
        }
    }
}
