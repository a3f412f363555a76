//! Mapping between [`ModelConfig`] and the persisted [`Document`] layout.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::{
    AnalyticFunctions, ConfigError, ConfigIssue, DustSettings, ImageSettings, ModelConfig,
    MoleculeSettings, RunSettings, UnitChoices, VariableFlags, VelocityDirection, str2bool,
};
use crate::params::BrightnessUnit;
use crate::parse::ini::Document;
use crate::units::{Dimension, SpeedUnit, Unit};

const VARS: &str = "VARS";
const UDS: &str = "UDS";
const FUNCS: &str = "FUNCS";
const MOL: &str = "MOL";
const PARS: &str = "PARS";
const IMG: &str = "IMG";
const DUST: &str = "DUST";

impl ModelConfig {
    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let document = Document::read_file(path)?;
        Self::from_document(&document)
    }

    /// Writes the configuration; the output parses back to an equal value.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.to_document().write_file(path)?;
        log::info!("configuration written to {}", path.display());
        Ok(())
    }

    /// Parses every value of the document.
    ///
    /// Absent and empty values become `None`; values that are present but
    /// malformed are all reported in one [`ConfigError::Invalid`].
    pub fn from_document(document: &Document) -> Result<Self, ConfigError> {
        let mut r = FieldReader {
            document,
            issues: Vec::new(),
        };

        let vars = VariableFlags {
            density: r.flag(VARS, "density"),
            velocity: r.flag(VARS, "velocity"),
            temperature: r.flag(VARS, "temperature"),
            turbulence: r.flag(VARS, "turbulence"),
        };

        let units = UnitChoices {
            xyzr: r.unit(UDS, "xyzr", Dimension::Length),
            density: r.unit(UDS, "density", Dimension::NumberDensity),
            velocity: r.speed(UDS, "velocity"),
            temperature: r.unit(UDS, "temperature", Dimension::Temperature),
            turbulence: r.speed(UDS, "turbulence"),
            radius: r.unit(UDS, "radius", Dimension::Length),
            minscale: r.unit(UDS, "minscale", Dimension::Length),
            velres: r.speed(UDS, "velres"),
            vsys: r.speed(UDS, "vsys"),
            distance: r.unit(UDS, "distance", Dimension::Length),
        };

        let velocity_direction = r
            .text(FUNCS, "vel_direction")
            .or_else(|| r.text(FUNCS, "vel_dir"))
            .map(|text| VelocityDirection::parse(&text))
            .unwrap_or_default();
        let functions = AnalyticFunctions {
            density: r.text(FUNCS, "dens_func"),
            temperature: r.text(FUNCS, "temp_func"),
            velocity: r.text(FUNCS, "vel_func"),
            turbulence: r.text(FUNCS, "turb_func"),
            velocity_direction,
        };

        let transition = r.number::<u32>(MOL, "trans");
        if transition == Some(0) {
            r.invalid(MOL, "trans", "0", "transitions are numbered from 1");
        }
        let molecule = MoleculeSettings {
            name: r.text(MOL, "mol_name"),
            transition: transition.filter(|&t| t > 0),
            rel_abundance_func: r.text(MOL, "rel_abundance_func"),
            data_file: r.path(MOL, "moldatfile"),
        };

        let run = RunSettings {
            shape_file: r.path(PARS, "shape_file"),
            fits_file: r.path(PARS, "fits_file"),
            radius: r.number(PARS, "radius"),
            minscale: r.number(PARS, "minscale"),
            p_intensity: r.number(PARS, "pintensity"),
            sink_points: r.number(PARS, "sinkpoints"),
            lte_only: r.flag(PARS, "lte"),
        };

        let unit = r.number::<u8>(IMG, "unit").and_then(|code| {
            let unit = BrightnessUnit::from_code(code);
            if unit.is_none() {
                r.invalid(IMG, "unit", &code.to_string(), "expected a code from 0 to 4");
            }
            unit
        });
        let image = ImageSettings {
            nchan: r.number(IMG, "nchan"),
            velres: r.number(IMG, "velres"),
            imgres: r.number(IMG, "imgres"),
            pxls: r.number(IMG, "pxls"),
            unit,
            vsys: r.number(IMG, "vsys"),
            distance: r.number(IMG, "distance"),
        };

        let dust = DustSettings {
            activated: r.flag(DUST, "dust_activated"),
            file: r.path(DUST, "dust_file"),
        };

        if !r.issues.is_empty() {
            return Err(ConfigError::Invalid(r.issues));
        }
        Ok(Self {
            vars,
            units,
            functions,
            molecule,
            run,
            image,
            dust,
        })
    }

    /// Serializes to the persisted layout. Absent values are omitted.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut w = FieldWriter(Document::new());

        // Coordinates are always tabulated.
        for axis in ["px", "py", "pz"] {
            w.flag(VARS, axis, true);
        }
        w.flag(VARS, "density", self.vars.density);
        w.flag(VARS, "velocity", self.vars.velocity);
        w.flag(VARS, "temperature", self.vars.temperature);
        w.flag(VARS, "turbulence", self.vars.turbulence);

        let u = &self.units;
        w.opt(UDS, "xyzr", u.xyzr);
        w.opt(UDS, "density", u.density);
        w.opt(UDS, "velocity", u.velocity);
        w.opt(UDS, "temperature", u.temperature);
        w.opt(UDS, "turbulence", u.turbulence);
        w.opt(UDS, "radius", u.radius);
        w.opt(UDS, "minscale", u.minscale);
        w.opt(UDS, "velres", u.velres);
        w.opt(UDS, "vsys", u.vsys);
        w.opt(UDS, "distance", u.distance);

        let f = &self.functions;
        w.opt(FUNCS, "dens_func", f.density.as_ref());
        w.opt(FUNCS, "temp_func", f.temperature.as_ref());
        w.opt(FUNCS, "vel_func", f.velocity.as_ref());
        w.opt(FUNCS, "turb_func", f.turbulence.as_ref());
        w.0.set(FUNCS, "vel_direction", f.velocity_direction.as_str());

        let m = &self.molecule;
        w.opt(MOL, "mol_name", m.name.as_ref());
        w.opt(MOL, "trans", m.transition);
        w.opt(MOL, "rel_abundance_func", m.rel_abundance_func.as_ref());
        w.opt(MOL, "moldatfile", m.data_file.as_deref().map(Path::display));

        let p = &self.run;
        w.opt(PARS, "shape_file", p.shape_file.as_deref().map(Path::display));
        w.opt(PARS, "fits_file", p.fits_file.as_deref().map(Path::display));
        w.opt(PARS, "radius", p.radius);
        w.opt(PARS, "minscale", p.minscale);
        w.opt(PARS, "pintensity", p.p_intensity);
        w.opt(PARS, "sinkpoints", p.sink_points);
        w.flag(PARS, "lte", p.lte_only);

        let i = &self.image;
        w.opt(IMG, "nchan", i.nchan);
        w.opt(IMG, "velres", i.velres);
        w.opt(IMG, "imgres", i.imgres);
        w.opt(IMG, "pxls", i.pxls);
        w.opt(IMG, "unit", i.unit.map(BrightnessUnit::code));
        w.opt(IMG, "vsys", i.vsys);
        w.opt(IMG, "distance", i.distance);

        w.flag(DUST, "dust_activated", self.dust.activated);
        w.opt(DUST, "dust_file", self.dust.file.as_deref().map(Path::display));

        w.0
    }
}

struct FieldReader<'a> {
    document: &'a Document,
    issues: Vec<ConfigIssue>,
}

impl FieldReader<'_> {
    fn text(&self, section: &str, key: &str) -> Option<String> {
        self.document
            .get(section, key)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    }

    fn flag(&self, section: &str, key: &str) -> bool {
        self.document.get(section, key).is_some_and(str2bool)
    }

    fn path(&self, section: &str, key: &str) -> Option<PathBuf> {
        self.text(section, key).map(PathBuf::from)
    }

    fn number<T>(&mut self, section: &'static str, key: &'static str) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let text = self.text(section, key)?;
        match text.parse() {
            Ok(value) => Some(value),
            Err(err) => {
                self.invalid(section, key, &text, &err.to_string());
                None
            }
        }
    }

    fn unit(&mut self, section: &str, key: &'static str, dimension: Dimension) -> Option<Unit> {
        let text = self.text(section, key)?;
        Unit::parse_with_dimension(&text, dimension)
            .map_err(|source| self.issues.push(ConfigIssue::Unit { key, source }))
            .ok()
    }

    fn speed(&mut self, section: &str, key: &'static str) -> Option<SpeedUnit> {
        let text = self.text(section, key)?;
        text.parse()
            .map_err(|source| self.issues.push(ConfigIssue::Unit { key, source }))
            .ok()
    }

    fn invalid(&mut self, section: &'static str, key: &'static str, value: &str, reason: &str) {
        self.issues.push(ConfigIssue::InvalidValue {
            section,
            key,
            value: value.to_owned(),
            reason: reason.to_owned(),
        });
    }
}

struct FieldWriter(Document);

impl FieldWriter {
    fn flag(&mut self, section: &str, key: &str, value: bool) {
        self.0.set(section, key, if value { "True" } else { "False" });
    }

    fn opt(&mut self, section: &str, key: &str, value: Option<impl Display>) {
        if let Some(value) = value {
            self.0.set(section, key, value.to_string());
        }
    }
}
