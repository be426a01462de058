//! Coordinate reference systems of tract layers.
//!
//! A layer's CRS is kept as a PROJ.4 definition string so any system
//! `proj4rs` understands can be declared on input. A handful of EPSG codes
//! common for Brazilian census geometry resolve to their definitions
//! directly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// SIRGAS 2000 geographic coordinates (EPSG:4674).
pub const EPSG_SIRGAS_2000: u32 = 4674;
/// WGS 84 geographic coordinates (EPSG:4326).
pub const EPSG_WGS84: u32 = 4326;

const GEOGRAPHIC_DEFINITION: &str = "+proj=longlat +ellps=GRS80 +no_defs";

/// Errors raised while parsing a CRS declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrsError {
    /// The EPSG code has no known definition.
    #[error("EPSG:{0} is not supported; pass a +proj definition instead")]
    UnsupportedEpsg(u32),

    /// The text is neither a keyword, an EPSG code nor a PROJ string.
    #[error("Unrecognized coordinate reference '{0}'")]
    Unrecognized(String),
}

/// Parameters of an ellipsoidal Albers equal-area conic projection.
///
/// Angles are in degrees, offsets in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlbersParams {
    /// First standard parallel.
    pub lat_1: f64,
    /// Second standard parallel.
    pub lat_2: f64,
    /// Latitude of origin.
    pub lat_0: f64,
    /// Central meridian.
    pub lon_0: f64,
    /// False easting.
    pub x_0: f64,
    /// False northing.
    pub y_0: f64,
    /// Ellipsoid semi-major axis.
    pub semi_major_axis: f64,
    /// Ellipsoid inverse flattening.
    pub inverse_flattening: f64,
}

impl AlbersParams {
    /// Brazil Albers: parallels -5/-42, origin -25/-55 on GRS80.
    pub const BRAZIL: Self = Self {
        lat_1: -5.0,
        lat_2: -42.0,
        lat_0: -25.0,
        lon_0: -55.0,
        x_0: 0.0,
        y_0: 0.0,
        semi_major_axis: 6_378_137.0,
        inverse_flattening: 298.257_222_101,
    };

    /// Renders the parameters as a PROJ.4 `aea` definition.
    #[must_use]
    pub fn to_proj_string(&self) -> String {
        format!(
            "+proj=aea +lat_0={} +lon_0={} +lat_1={} +lat_2={} +x_0={} +y_0={} +a={} +rf={} +units=m +no_defs",
            self.lat_0,
            self.lon_0,
            self.lat_1,
            self.lat_2,
            self.x_0,
            self.y_0,
            self.semi_major_axis,
            self.inverse_flattening,
        )
    }
}

/// Coordinate reference of a layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Crs {
    /// SIRGAS 2000 longitude/latitude in degrees.
    Geographic,
    /// Any system given by its PROJ.4 definition.
    Proj(String),
}

impl Crs {
    /// The Albers equal-area system described by `params`.
    #[must_use]
    pub fn albers(params: &AlbersParams) -> Self {
        Self::Proj(params.to_proj_string())
    }

    /// Resolves an EPSG code to its definition.
    ///
    /// # Errors
    ///
    /// Returns [`CrsError::UnsupportedEpsg`] for codes without a known
    /// definition.
    pub fn from_epsg(code: u32) -> Result<Self, CrsError> {
        epsg_definition(code)
            .map(Self::Proj)
            .ok_or(CrsError::UnsupportedEpsg(code))
    }

    /// The PROJ.4 definition string.
    #[must_use]
    pub fn definition(&self) -> &str {
        match self {
            Self::Geographic => GEOGRAPHIC_DEFINITION,
            Self::Proj(definition) => definition,
        }
    }

    /// Whether coordinates are longitude/latitude degrees.
    #[must_use]
    pub fn is_geographic(&self) -> bool {
        self.definition()
            .split_whitespace()
            .any(|token| matches!(token, "+proj=longlat" | "+proj=latlong" | "+proj=lonlat"))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geographic => f.write_str("geographic"),
            Self::Proj(definition) => f.write_str(definition),
        }
    }
}

impl FromStr for Crs {
    type Err = CrsError;

    /// Accepts `geographic`, `EPSG:<code>` or a `+proj=...` definition.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        if trimmed.eq_ignore_ascii_case("geographic") {
            return Ok(Self::Geographic);
        }

        if let Some((prefix, code)) = trimmed.split_once(':')
            && prefix.eq_ignore_ascii_case("epsg")
        {
            let code = code
                .trim()
                .parse::<u32>()
                .map_err(|_| CrsError::Unrecognized(trimmed.to_owned()))?;
            return Self::from_epsg(code);
        }

        if trimmed.starts_with("+proj=") {
            return Ok(Self::Proj(trimmed.to_owned()));
        }

        Err(CrsError::Unrecognized(trimmed.to_owned()))
    }
}

/// Coordinate reference as declared on the command line: either the
/// configured Albers projection or an explicit system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrsChoice {
    /// Already projected with the configured Albers parameters.
    ConfiguredAlbers,
    /// An explicit system.
    Explicit(Crs),
}

impl CrsChoice {
    /// Resolves the choice, using `params` for the configured Albers.
    #[must_use]
    pub fn resolve(self, params: &AlbersParams) -> Crs {
        match self {
            Self::ConfiguredAlbers => Crs::albers(params),
            Self::Explicit(crs) => crs,
        }
    }
}

impl FromStr for CrsChoice {
    type Err = CrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("albers") {
            return Ok(Self::ConfiguredAlbers);
        }
        s.parse().map(Self::Explicit)
    }
}

fn epsg_definition(code: u32) -> Option<String> {
    match code {
        EPSG_SIRGAS_2000 => Some(GEOGRAPHIC_DEFINITION.to_owned()),
        EPSG_WGS84 => Some("+proj=longlat +datum=WGS84 +no_defs".to_owned()),
        // SIRGAS 2000 / UTM zones 18S to 25S
        31978..=31985 => Some(format!(
            "+proj=utm +zone={} +south +ellps=GRS80 +units=m +no_defs",
            code - 31960
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keywords_codes_and_definitions() {
        assert_eq!("Geographic".parse::<Crs>(), Ok(Crs::Geographic));
        assert_eq!(
            "EPSG:31983".parse::<Crs>(),
            Ok(Crs::Proj(
                "+proj=utm +zone=23 +south +ellps=GRS80 +units=m +no_defs".to_owned()
            ))
        );
        assert_eq!(
            "epsg:4674".parse::<Crs>().map(|c| c.is_geographic()),
            Ok(true)
        );
        assert_eq!(
            "+proj=utm +zone=23 +south +ellps=GRS80".parse::<Crs>(),
            Ok(Crs::Proj("+proj=utm +zone=23 +south +ellps=GRS80".to_owned()))
        );
    }

    #[test]
    fn rejects_unknown_declarations() {
        assert_eq!("EPSG:9999".parse::<Crs>(), Err(CrsError::UnsupportedEpsg(9999)));
        assert!(matches!("mercator".parse::<Crs>(), Err(CrsError::Unrecognized(_))));
        assert!(matches!("EPSG:abc".parse::<Crs>(), Err(CrsError::Unrecognized(_))));
    }

    #[test]
    fn geographic_detection() {
        assert!(Crs::Geographic.is_geographic());
        assert!(!Crs::albers(&AlbersParams::BRAZIL).is_geographic());
        assert!(!Crs::from_epsg(31983).unwrap().is_geographic());
    }

    #[test]
    fn renders_brazil_albers_definition() {
        assert_eq!(
            AlbersParams::BRAZIL.to_proj_string(),
            "+proj=aea +lat_0=-25 +lon_0=-55 +lat_1=-5 +lat_2=-42 +x_0=0 +y_0=0 +a=6378137 +rf=298.257222101 +units=m +no_defs"
        );
    }

    #[test]
    fn resolves_choice() {
        assert_eq!(
            "albers".parse::<CrsChoice>().map(|c| c.resolve(&AlbersParams::BRAZIL)),
            Ok(Crs::albers(&AlbersParams::BRAZIL))
        );
        assert_eq!(
            "geographic".parse::<CrsChoice>().map(|c| c.resolve(&AlbersParams::BRAZIL)),
            Ok(Crs::Geographic)
        );
        assert!("utm".parse::<CrsChoice>().is_err());
    }
}
