//! Playlist renderers
//!
//! A closed set of output formats behind one dispatch table. Rendering is
//! pure: `(playlist, resolved tracks, options) → bytes`; writing the result
//! under the exports directory is the API layer's business.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use cueflow_common::models::{Playlist, Track};
use cueflow_common::{Error, Result};

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    M3u,
    Json,
    Csv,
    Rekordbox,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::M3u,
        ExportFormat::Json,
        ExportFormat::Csv,
        ExportFormat::Rekordbox,
    ];

    /// Conventional file extension for the format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::M3u => "m3u",
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Rekordbox => "xml",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::M3u => "m3u",
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Rekordbox => "rekordbox",
        };
        f.write_str(name)
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "m3u" => Ok(ExportFormat::M3u),
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "rekordbox" => Ok(ExportFormat::Rekordbox),
            other => Err(Error::InvalidArgument(format!(
                "unknown export format: {other:?}"
            ))),
        }
    }
}

/// One playlist position with whatever track detail the store still has
#[derive(Debug, Clone)]
pub struct ExportItem {
    pub path: PathBuf,
    pub transition_score: f64,
    pub track: Option<Track>,
}

type Renderer = fn(&Playlist, &[ExportItem], bool) -> Result<Vec<u8>>;

/// The format dispatch table
const RENDERERS: [(ExportFormat, Renderer); 4] = [
    (ExportFormat::M3u, render_m3u),
    (ExportFormat::Json, render_json),
    (ExportFormat::Csv, render_csv),
    (ExportFormat::Rekordbox, render_rekordbox),
];

/// Render `playlist` to bytes in `format`
pub fn render(
    playlist: &Playlist,
    items: &[ExportItem],
    format: ExportFormat,
    include_metadata: bool,
) -> Result<Vec<u8>> {
    let (_, renderer) = RENDERERS
        .iter()
        .find(|(f, _)| *f == format)
        .expect("every format has a renderer");
    renderer(playlist, items, include_metadata)
}

fn render_m3u(_playlist: &Playlist, items: &[ExportItem], include_metadata: bool) -> Result<Vec<u8>> {
    let mut out = String::from("#EXTM3U\n");
    for item in items {
        if include_metadata {
            if let Some(track) = &item.track {
                let artist = track.tags.artist.as_deref().unwrap_or("Unknown Artist");
                out.push_str(&format!(
                    "#EXTINF:{},{} - {}\n",
                    track.duration_seconds.round() as i64,
                    artist,
                    track.display_name(),
                ));
            }
        }
        out.push_str(&item.path.display().to_string());
        out.push('\n');
    }
    Ok(out.into_bytes())
}

fn render_json(playlist: &Playlist, items: &[ExportItem], include_metadata: bool) -> Result<Vec<u8>> {
    let tracks: Vec<serde_json::Value> = items
        .iter()
        .map(|item| {
            let mut value = serde_json::json!({
                "path": item.path.display().to_string(),
                "transition_score": item.transition_score,
            });
            if include_metadata {
                if let Some(track) = &item.track {
                    value["track"] = serde_json::to_value(track).unwrap_or(serde_json::Value::Null);
                }
            }
            value
        })
        .collect();

    let doc = serde_json::json!({
        "id": playlist.id,
        "created_at": playlist.created_at,
        "metadata": playlist.metadata,
        "tracks": tracks,
    });
    serde_json::to_vec_pretty(&doc)
        .map_err(|err| Error::Internal(format!("json render failed: {err}")))
}

fn render_csv(_playlist: &Playlist, items: &[ExportItem], include_metadata: bool) -> Result<Vec<u8>> {
    let mut out = String::new();
    if include_metadata {
        out.push_str("position,path,artist,title,bpm,key,energy,duration_seconds,transition_score\n");
    } else {
        out.push_str("position,path,transition_score\n");
    }
    for (position, item) in items.iter().enumerate() {
        let path = csv_field(&item.path.display().to_string());
        if include_metadata {
            let (artist, title, bpm, key, energy, duration) = match &item.track {
                Some(track) => {
                    let features = track.features.as_ref();
                    (
                        csv_field(track.tags.artist.as_deref().unwrap_or("")),
                        csv_field(&track.display_name()),
                        features.map(|f| format!("{:.2}", f.bpm)).unwrap_or_default(),
                        features.map(|f| f.key.to_string()).unwrap_or_default(),
                        features.map(|f| format!("{:.3}", f.energy)).unwrap_or_default(),
                        format!("{:.1}", track.duration_seconds),
                    )
                }
                None => Default::default(),
            };
            out.push_str(&format!(
                "{},{path},{artist},{title},{bpm},{key},{energy},{duration},{:.4}\n",
                position + 1,
                item.transition_score,
            ));
        } else {
            out.push_str(&format!(
                "{},{path},{:.4}\n",
                position + 1,
                item.transition_score
            ));
        }
    }
    Ok(out.into_bytes())
}

/// Rekordbox-flavoured XML. Cue points and beatgrids are only written when
/// the library carries them; today it does not, so `POSITION_MARK` nodes are
/// omitted entirely rather than zero-filled.
fn render_rekordbox(
    playlist: &Playlist,
    items: &[ExportItem],
    _include_metadata: bool,
) -> Result<Vec<u8>> {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<DJ_PLAYLISTS Version=\"1.0.0\">\n");
    out.push_str("  <PRODUCT Name=\"cueflow\" Version=\"");
    out.push_str(env!("CARGO_PKG_VERSION"));
    out.push_str("\" Company=\"\"/>\n");

    out.push_str(&format!(
        "  <COLLECTION Entries=\"{}\">\n",
        items.len()
    ));
    for (index, item) in items.iter().enumerate() {
        let track_id = index + 1;
        let (name, artist, bpm, tonality, total_time) = match &item.track {
            Some(track) => (
                xml_escape(&track.display_name()),
                xml_escape(track.tags.artist.as_deref().unwrap_or("")),
                track
                    .features
                    .as_ref()
                    .map(|f| format!("{:.2}", f.bpm))
                    .unwrap_or_default(),
                track
                    .features
                    .as_ref()
                    .map(|f| f.key.to_string())
                    .unwrap_or_default(),
                format!("{}", track.duration_seconds.round() as i64),
            ),
            None => (
                xml_escape(
                    &item
                        .path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                ),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
            ),
        };
        out.push_str(&format!(
            "    <TRACK TrackID=\"{track_id}\" Name=\"{name}\" Artist=\"{artist}\" \
             AverageBpm=\"{bpm}\" Tonality=\"{tonality}\" TotalTime=\"{total_time}\" \
             Location=\"file://localhost{}\"/>\n",
            xml_escape(&item.path.display().to_string()),
        ));
    }
    out.push_str("  </COLLECTION>\n");

    out.push_str("  <PLAYLISTS>\n");
    out.push_str("    <NODE Type=\"0\" Name=\"ROOT\" Count=\"1\">\n");
    out.push_str(&format!(
        "      <NODE Name=\"{}\" Type=\"1\" KeyType=\"0\" Entries=\"{}\">\n",
        xml_escape(&format!("cueflow {}", playlist.metadata.preset)),
        items.len()
    ));
    for index in 1..=items.len() {
        out.push_str(&format!("        <TRACK Key=\"{index}\"/>\n"));
    }
    out.push_str("      </NODE>\n");
    out.push_str("    </NODE>\n");
    out.push_str("  </PLAYLISTS>\n");
    out.push_str("</DJ_PLAYLISTS>\n");
    Ok(out.into_bytes())
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cueflow_common::ids::new_sortable_id;
    use cueflow_common::models::{PlaylistEntry, PlaylistMetadata};

    fn playlist(paths: &[&str]) -> (Playlist, Vec<ExportItem>) {
        let tracks: Vec<PlaylistEntry> = paths
            .iter()
            .enumerate()
            .map(|(i, p)| PlaylistEntry {
                path: PathBuf::from(p),
                transition_score: if i == 0 { 0.0 } else { 0.8 },
            })
            .collect();
        let items: Vec<ExportItem> = tracks
            .iter()
            .map(|entry| ExportItem {
                path: entry.path.clone(),
                transition_score: entry.transition_score,
                track: None,
            })
            .collect();
        let playlist = Playlist {
            id: new_sortable_id(),
            created_at: Utc::now(),
            tracks,
            metadata: PlaylistMetadata {
                total_duration_seconds: 600.0,
                avg_bpm: 125.0,
                energy_curve: vec![0.5; 16],
                preset: "peak_time".to_string(),
                parameters: serde_json::json!({}),
                truncated: false,
                empty: false,
            },
        };
        (playlist, items)
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("m3u".parse::<ExportFormat>().unwrap(), ExportFormat::M3u);
        assert_eq!(
            "REKORDBOX".parse::<ExportFormat>().unwrap(),
            ExportFormat::Rekordbox
        );
        assert!("flac".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_m3u_has_exactly_n_path_lines() {
        let (playlist, items) = playlist(&["/m/a.wav", "/m/b.wav", "/m/c.wav"]);
        let bytes = render(&playlist, &items, ExportFormat::M3u, false).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let path_lines: Vec<&str> = text
            .lines()
            .filter(|l| !l.starts_with('#') && !l.is_empty())
            .collect();
        assert_eq!(path_lines, vec!["/m/a.wav", "/m/b.wav", "/m/c.wav"]);
    }

    #[test]
    fn test_m3u_round_trip_is_byte_identical() {
        let (playlist, items) = playlist(&["/m/a.wav", "/m/b.wav"]);
        let first = render(&playlist, &items, ExportFormat::M3u, false).unwrap();

        // Re-import the path list, re-export, compare bytes.
        let text = String::from_utf8(first.clone()).unwrap();
        let reimported: Vec<ExportItem> = text
            .lines()
            .filter(|l| !l.starts_with('#') && !l.is_empty())
            .enumerate()
            .map(|(i, line)| ExportItem {
                path: PathBuf::from(line),
                transition_score: if i == 0 { 0.0 } else { 0.8 },
                track: None,
            })
            .collect();
        let second = render(&playlist, &reimported, ExportFormat::M3u, false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_csv_escapes_awkward_fields() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");

        let (playlist, items) = playlist(&["/m/with, comma.wav"]);
        let bytes = render(&playlist, &items, ExportFormat::Csv, false).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"/m/with, comma.wav\""));
    }

    #[test]
    fn test_json_parses_back() {
        let (playlist, items) = playlist(&["/m/a.wav", "/m/b.wav"]);
        let bytes = render(&playlist, &items, ExportFormat::Json, true).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["tracks"].as_array().unwrap().len(), 2);
        assert_eq!(value["metadata"]["preset"], "peak_time");
    }

    #[test]
    fn test_rekordbox_shape() {
        let (playlist, items) = playlist(&["/m/a & b.wav"]);
        let bytes = render(&playlist, &items, ExportFormat::Rekordbox, true).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("<DJ_PLAYLISTS"));
        assert!(text.contains("Entries=\"1\""));
        // Escaped path, and no zero-filled cue markers.
        assert!(text.contains("a &amp; b.wav"));
        assert!(!text.contains("POSITION_MARK"));
    }

    #[test]
    fn test_every_format_renders() {
        let (playlist, items) = playlist(&["/m/a.wav"]);
        for format in ExportFormat::ALL {
            let bytes = render(&playlist, &items, format, true).unwrap();
            assert!(!bytes.is_empty());
        }
    }
}
