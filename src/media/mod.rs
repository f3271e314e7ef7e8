//! Media descriptor construction
//!
//! Builds the `media` object of a LOAD command from optional track
//! metadata and the local HTTP serving address. The receiver treats the
//! content as a live stream fetched back from the sender.

use serde::Serialize;

/// Stream type advertised to the receiver; the sender serves a live
/// transcode, so seeking is handled sender-side.
pub const STREAM_TYPE: &str = "LIVE";

/// Path the local HTTP server exposes the stream under
pub const STREAM_PATH: &str = "/stream";

/// Generic metadata type
pub const METADATA_TYPE_GENERIC: u32 = 0;

/// Music track metadata type
pub const METADATA_TYPE_MUSIC: u32 = 3;

/// Optional track metadata, as supplied by the caller's metadata lookup.
///
/// `now_playing` and `es_now_playing` are broadcast-style fallbacks for
/// streams that carry no proper title tag.
#[derive(Debug, Clone, Default)]
pub struct MediaMeta {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_number: Option<String>,
    pub disc_number: Option<String>,
    pub artwork_url: Option<String>,
    pub now_playing: Option<String>,
    pub es_now_playing: Option<String>,
}

/// Artwork entry inside the metadata block
#[derive(Debug, Clone, Serialize)]
pub struct Image {
    pub url: String,
}

/// The `metadata` block of a media descriptor.
///
/// Only emitted when a title could be resolved; music-only fields are
/// only emitted for audio MIME types.
#[derive(Debug, Clone, Serialize)]
pub struct MediaMetadata {
    #[serde(rename = "metadataType")]
    pub metadata_type: u32,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(rename = "albumArtist", skip_serializing_if = "Option::is_none")]
    pub album_artist: Option<String>,
    #[serde(rename = "trackNumber", skip_serializing_if = "Option::is_none")]
    pub track_number: Option<String>,
    #[serde(rename = "discNumber", skip_serializing_if = "Option::is_none")]
    pub disc_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Image>>,
}

/// The `media` object of a LOAD command.
#[derive(Debug, Clone, Serialize)]
pub struct MediaInformation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MediaMetadata>,
    #[serde(rename = "contentId")]
    pub content_id: String,
    #[serde(rename = "streamType")]
    pub stream_type: &'static str,
    #[serde(rename = "contentType")]
    pub content_type: String,
}

impl MediaInformation {
    /// Assemble a media descriptor.
    ///
    /// `local_ip` and `port` locate the HTTP server this sender runs;
    /// the receiver fetches the stream back from
    /// `http://<local_ip>:<port>/stream`.
    pub fn new(local_ip: &str, port: u16, mime: &str, meta: Option<&MediaMeta>) -> Self {
        let is_music = mime.starts_with("audio");

        let metadata = meta.and_then(|meta| {
            let title = meta
                .title
                .as_deref()
                .or(meta.now_playing.as_deref())
                .or(meta.es_now_playing.as_deref())?;

            let artwork = meta
                .artwork_url
                .as_deref()
                .filter(|url| url.starts_with("http"));

            let mut block = MediaMetadata {
                metadata_type: if is_music {
                    METADATA_TYPE_MUSIC
                } else {
                    METADATA_TYPE_GENERIC
                },
                title: title.to_string(),
                artist: None,
                album: None,
                album_artist: None,
                track_number: None,
                disc_number: None,
                images: artwork.map(|url| vec![Image { url: url.to_string() }]),
            };

            // Music-only fields ride along only on audio content, and only
            // when the track carries a real title tag.
            if is_music && meta.title.is_some() {
                block.artist = meta.artist.clone();
                block.album = meta.album.clone();
                block.album_artist = meta.album_artist.clone();
                block.track_number = meta.track_number.clone();
                block.disc_number = meta.disc_number.clone();
            }

            Some(block)
        });

        let content_id = format!("http://{local_ip}:{port}{STREAM_PATH}");
        tracing::debug!(%content_id, "assembled media descriptor");

        Self {
            metadata,
            content_id,
            stream_type: STREAM_TYPE,
            content_type: mime.to_string(),
        }
    }
}
