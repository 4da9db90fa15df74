use std::collections::BTreeMap;

use bevy::prelude::*;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{color::VertexColor, error::PaintTaskError, task::TaskResult};


const LOD_SEPARATOR: char = '|';
const RUN_SEPARATOR: char = ',';
const COUNT_SEPARATOR: char = 'x';

/// Upper bound on the vertices one serialized LOD may expand to.
pub const MAX_SERIALIZED_LOD_VERTICES: usize = 1 << 24;


/// Captured per-LOD colors of a mesh, re-applied verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSnippet {
    pub id: String,
    pub mesh_name: Option<String>,
    pub lods: Vec<Vec<VertexColor>>,
}

impl ColorSnippet {
    pub fn new(id: impl Into<String>, lods: Vec<Vec<VertexColor>>) -> Self {
        Self {
            id: id.into(),
            mesh_name: None,
            lods,
        }
    }

    pub fn with_mesh_name(mut self, name: impl Into<String>) -> Self {
        self.mesh_name = Some(name.into());
        self
    }

    /// Captures every LOD whose colors the result carries.
    pub fn capture(id: impl Into<String>, result: &TaskResult) -> Option<Self> {
        if !result.success {
            return None;
        }

        let lods: Vec<Vec<VertexColor>> = result
            .lods
            .iter()
            .map(|lod| lod.colors.clone().unwrap_or_default())
            .collect();
        if lods.iter().all(Vec::is_empty) {
            return None;
        }

        Some(Self::new(id, lods))
    }

    pub fn serialize(&self) -> String {
        serialize_lod_colors(&self.lods)
    }
}


#[derive(Resource, Clone, Debug, Default, Serialize, Deserialize)]
pub struct SnippetLibrary {
    snippets: BTreeMap<String, ColorSnippet>,
}

impl SnippetLibrary {
    /// Returns the snippet previously stored under the same id.
    pub fn insert(&mut self, snippet: ColorSnippet) -> Option<ColorSnippet> {
        self.snippets.insert(snippet.id.clone(), snippet)
    }

    pub fn get(&self, id: &str) -> Option<&ColorSnippet> {
        self.snippets.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<ColorSnippet> {
        self.snippets.remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.snippets.keys().map(String::as_str)
    }

    pub fn for_mesh<'a>(&'a self, mesh_name: &'a str) -> impl Iterator<Item = &'a ColorSnippet> {
        self.snippets
            .values()
            .filter(move |snippet| snippet.mesh_name.as_deref() == Some(mesh_name))
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}


/// Run-length text form: `|` between LODs, `,` between runs, each run `NxRRGGBBAA`.
pub fn serialize_lod_colors(lods: &[Vec<VertexColor>]) -> String {
    lods.iter()
        .map(|colors| {
            colors
                .iter()
                .dedup_with_count()
                .map(|(count, [r, g, b, a])| {
                    format!("{count}{COUNT_SEPARATOR}{r:02X}{g:02X}{b:02X}{a:02X}")
                })
                .join(&RUN_SEPARATOR.to_string())
        })
        .join(&LOD_SEPARATOR.to_string())
}

pub fn deserialize_lod_colors(serialized: &str) -> Result<Vec<Vec<VertexColor>>, PaintTaskError> {
    serialized
        .split(LOD_SEPARATOR)
        .map(|lod| {
            let mut colors = Vec::new();
            let runs = lod.split(RUN_SEPARATOR).map(str::trim).filter(|run| !run.is_empty());
            for run in runs {
                let (count, color) = parse_run(run)?;
                let total = colors
                    .len()
                    .checked_add(count)
                    .filter(|total| *total <= MAX_SERIALIZED_LOD_VERTICES);
                if total.is_none() {
                    return Err(PaintTaskError::MalformedSerializedColors(format!(
                        "run {run} exceeds {MAX_SERIALIZED_LOD_VERTICES} vertices per LOD"
                    )));
                }
                colors.extend(std::iter::repeat_n(color, count));
            }
            Ok(colors)
        })
        .collect()
}

fn parse_run(run: &str) -> Result<(usize, VertexColor), PaintTaskError> {
    let malformed = || PaintTaskError::MalformedSerializedColors(run.to_string());

    let (count, hex) = run.split_once(COUNT_SEPARATOR).ok_or_else(malformed)?;
    let count: usize = count.parse().map_err(|_| malformed())?;
    if hex.len() != 8 || !hex.is_ascii() {
        return Err(malformed());
    }

    let mut color = [0u8; 4];
    for (channel, value) in color.iter_mut().enumerate() {
        let pair = &hex[channel * 2..channel * 2 + 2];
        *value = u8::from_str_radix(pair, 16).map_err(|_| malformed())?;
    }
    Ok((count, color))
}
