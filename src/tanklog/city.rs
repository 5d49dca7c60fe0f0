// Tanklog - Log water quality sensor readings to Google Sheets
//
// Copyright 2025 The tanklog authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

/// City used for weather lookups when the layout cell is empty or unreadable.
pub const FALLBACK_CITY: &str = "San Mateo,US";

/// Cell on the layout worksheet that names the weather city.
pub(crate) const CITY_CELL: &str = "G22";

/// Normalize the configured city cell into a `Name,CountryCode` query string.
///
/// An absent or empty cell falls back to `FALLBACK_CITY`; a bare city name
/// gets the US country code appended; anything already carrying a comma is
/// passed through untouched.
pub fn normalize(cell: Option<String>) -> String {
    match cell {
        None => FALLBACK_CITY.to_string(),
        Some(city) if city.is_empty() => FALLBACK_CITY.to_string(),
        Some(city) if !city.contains(',') => format!("{},US", city),
        Some(city) => city,
    }
}

#[cfg(test)]
mod test {
    use super::{normalize, FALLBACK_CITY};

    #[test]
    fn test_normalize_absent_cell() {
        assert_eq!(FALLBACK_CITY, normalize(None));
    }

    #[test]
    fn test_normalize_empty_cell() {
        assert_eq!(FALLBACK_CITY, normalize(Some(String::new())));
    }

    #[test]
    fn test_normalize_appends_country_code() {
        assert_eq!("Austin,US", normalize(Some("Austin".to_string())));
    }

    #[test]
    fn test_normalize_passes_through_qualified_city() {
        assert_eq!("Austin,US", normalize(Some("Austin,US".to_string())));
        assert_eq!("Reykjavik,IS", normalize(Some("Reykjavik,IS".to_string())));
    }
}
