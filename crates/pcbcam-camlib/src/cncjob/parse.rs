//! G-Code parsing and export.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use geo::{Coord, LineString};
use pcbcam_core::Units;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{CncJob, Motion, ParsedPath, PathKind, Speed};
use crate::error::CamResult;
use crate::geometry::{arc, ArcDirection};

fn code_pattern() -> &'static Regex {
    static CODE: OnceLock<Regex> = OnceLock::new();
    CODE.get_or_init(|| Regex::new(r"^\s*([A-Z])\s*([\+\-\.\d\s]+)").expect("invalid regex pattern"))
}

/// Split a G-Code block into its letter/value words.
///
/// `"G01 X1.5 Y-2"` gives `{G: 1, X: 1.5, Y: -2}`. Parsing stops at the
/// first token that is not a word.
pub fn codes_split(line: &str) -> BTreeMap<char, f64> {
    let mut codes = BTreeMap::new();
    let mut rest = line;
    while let Some(caps) = code_pattern().captures(rest) {
        let (Some(whole), Some(letter), Some(value)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            break;
        };
        let digits: String = value.as_str().chars().filter(|c| !c.is_whitespace()).collect();
        match digits.parse::<f64>() {
            Ok(v) => {
                if let Some(ch) = letter.as_str().chars().next() {
                    codes.insert(ch, v);
                }
            }
            Err(_) => {
                debug!("Unreadable word {}{}", letter.as_str(), digits);
                break;
            }
        }
        rest = &rest[whole.end()..];
    }
    codes
}

impl CncJob {
    /// Rebuild toolpaths from `gcode`.
    ///
    /// A new path starts whenever Z changes. Each path is tagged as travel
    /// (Z above zero) or cut, and as rapid (G0) or feed.
    pub fn gcode_parse(&mut self) -> &[ParsedPath] {
        let mut current: BTreeMap<char, f64> = [('X', 0.0), ('Y', 0.0), ('Z', 0.0), ('G', 0.0)].into();
        let mut path: Vec<Coord<f64>> = vec![Coord { x: 0.0, y: 0.0 }];
        let mut kind = PathKind::default();
        let mut parsed = Vec::new();

        for line in self.gcode.lines() {
            let gobj = codes_split(line);

            if let Some(&g) = gobj.get(&'G') {
                if g == 20.0 {
                    self.units = Units::In;
                    continue;
                }
                if g == 21.0 {
                    self.units = Units::Mm;
                    continue;
                }
            }

            if let Some(&z) = gobj.get(&'Z') {
                if (gobj.contains_key(&'X') || gobj.contains_key(&'Y')) && current.get(&'Z') != Some(&z) {
                    warn!("Non-orthogonal motion: from {:?} to {:?}", current, gobj);
                }
                current.insert('Z', z);
                if path.len() > 1 {
                    let last = path[path.len() - 1];
                    parsed.push(ParsedPath {
                        path: LineString::from(std::mem::take(&mut path)),
                        kind,
                    });
                    path.push(last);
                }
            }

            if let Some(&g) = gobj.get(&'G') {
                current.insert('G', g.trunc());
            }

            if gobj.contains_key(&'X') || gobj.contains_key(&'Y') {
                let cur = |k: char| current.get(&k).copied().unwrap_or(0.0);
                let x = gobj.get(&'X').copied().unwrap_or_else(|| cur('X'));
                let y = gobj.get(&'Y').copied().unwrap_or_else(|| cur('Y'));

                kind = PathKind {
                    motion: if cur('Z') > 0.0 { Motion::Travel } else { Motion::Cut },
                    speed: if cur('G') > 0.0 { Speed::Slow } else { Speed::Fast },
                };

                let g = cur('G') as i64;
                match g {
                    0 | 1 => path.push(Coord { x, y }),
                    2 | 3 => {
                        let i = gobj.get(&'I').copied().unwrap_or(0.0);
                        let j = gobj.get(&'J').copied().unwrap_or(0.0);
                        let center = Coord {
                            x: i + cur('X'),
                            y: j + cur('Y'),
                        };
                        let radius = i.hypot(j);
                        let start = (-j).atan2(-i);
                        let stop = (y - center.y).atan2(x - center.x);
                        let direction = if g == 2 { ArcDirection::Cw } else { ArcDirection::Ccw };
                        path.extend(arc(center, radius, start, stop, direction, self.steps_per_circle));
                    }
                    other => debug!("Motion G{} ignored", other),
                }
            }

            for (k, v) in &gobj {
                current.insert(*k, *v);
            }
        }

        if path.len() > 1 {
            parsed.push(ParsedPath {
                path: LineString::from(path),
                kind,
            });
        }

        debug!("{} toolpaths parsed", parsed.len());
        self.gcode_parsed = parsed;
        &self.gcode_parsed
    }

    /// The program wrapped in `preamble` and `postamble`.
    pub fn get_gcode(&self, preamble: &str, postamble: &str) -> String {
        format!("{}\n{}\n{}", preamble, self.gcode, postamble)
    }

    /// Write the program to `path`. With `dwell`, a `G4 P<dwell>` follows
    /// every spindle start and any existing dwell there is replaced.
    pub fn export_gcode(
        &self,
        path: impl AsRef<Path>,
        preamble: &str,
        postamble: &str,
        dwell: Option<f64>,
    ) -> CamResult<()> {
        let text = self.get_gcode(preamble, postamble);
        let text = match dwell {
            Some(seconds) => {
                let mut out = Vec::new();
                let mut spindle_started = false;
                for line in text.lines() {
                    let upper = line.trim().to_ascii_uppercase();
                    if spindle_started && upper.starts_with("G4") {
                        spindle_started = false;
                        continue;
                    }
                    spindle_started = false;
                    out.push(line.to_string());
                    if upper.starts_with("M03") || upper.starts_with("M04") {
                        out.push(format!("G4 P{}", seconds));
                        spindle_started = true;
                    }
                }
                let mut joined = out.join("\n");
                joined.push('\n');
                joined
            }
            None => text,
        };
        fs::write(path.as_ref(), text)?;
        info!("G-Code written to {}", path.as_ref().display());
        Ok(())
    }
}
