use rtmpc_amf0::{Amf0Object, Amf0Value};

use super::status::StreamStatus;

/// Values harvested from an `onMetaData` notification
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamMetadata {
    pub duration_seconds: Option<f64>,
    pub total_size: Option<u64>,
    pub audio_bitrate_kbps: Option<f64>,
    pub video_bitrate_kbps: Option<f64>,
    pub audio_codec: Option<String>,
    pub audio_sample_rate: Option<u32>,
    pub audio_channels: Option<u32>,
    pub audio_is_stereo: Option<bool>,
    pub video_codec: Option<String>,
    pub video_width: Option<u32>,
    pub video_height: Option<u32>,
    pub video_frame_rate: Option<f32>,
    pub encoder: Option<String>,
}

/// The ID3v1 style fields carried by an `onID3` notification
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Id3Tags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<String>,
    pub comment: Option<String>,
    pub genre: Option<String>,
    pub track: Option<String>,
}

/// A data (`Amf0Data`) message sent on a playing stream
#[derive(Clone, Debug, PartialEq)]
pub enum StreamData {
    MetaData(StreamMetadata),
    Id3(Id3Tags),
    Status(StreamStatus),

    /// Any other handler name, for logging
    Other(String),
}

impl StreamData {
    pub fn parse(values: &[Amf0Value]) -> Option<StreamData> {
        let mut values = values.iter();
        let mut name = values.next()?.as_str()?;
        if name == "@setDataFrame" {
            name = values.next()?.as_str()?;
        }

        let empty = Amf0Object::new();
        let properties = values
            .find_map(|value| value.as_object())
            .unwrap_or(&empty);

        let data = match name {
            "onMetaData" => StreamData::MetaData(StreamMetadata::from_properties(properties)),
            "onID3" => StreamData::Id3(Id3Tags::from_properties(properties)),
            "onStatus" | "onPlayStatus" => match StreamStatus::from_info(properties) {
                Some(status) => StreamData::Status(status),
                None => StreamData::Other(name.to_string()),
            },

            other => StreamData::Other(other.to_string()),
        };

        Some(data)
    }
}

impl StreamMetadata {
    pub fn from_properties(properties: &Amf0Object) -> StreamMetadata {
        let number = |name: &str| first_match(properties, name).and_then(Amf0Value::as_number);

        StreamMetadata {
            duration_seconds: number("duration"),
            total_size: number("filesize")
                .or_else(|| number("datasize"))
                .map(|x| x as u64),
            audio_bitrate_kbps: number("audiodatarate"),
            video_bitrate_kbps: number("videodatarate"),
            audio_codec: first_match(properties, "audiocodecid").and_then(text),
            audio_sample_rate: number("audiosamplerate").map(|x| x as u32),
            audio_channels: number("audiochannels").map(|x| x as u32),
            audio_is_stereo: first_match(properties, "stereo").and_then(|value| match *value {
                Amf0Value::Boolean(x) => Some(x),
                _ => None,
            }),
            video_codec: first_match(properties, "videocodecid").and_then(text),
            video_width: number("width").map(|x| x as u32),
            video_height: number("height").map(|x| x as u32),
            video_frame_rate: number("framerate").map(|x| x as f32),
            encoder: first_match(properties, "encoder").and_then(text),
        }
    }
}

impl Id3Tags {
    pub fn from_properties(properties: &Amf0Object) -> Id3Tags {
        let field = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| first_match(properties, name))
                .find_map(text)
        };

        Id3Tags {
            title: field(&["songName", "title", "TIT2"]),
            artist: field(&["artist", "TPE1"]),
            album: field(&["album", "TALB"]),
            year: field(&["year", "TYER"]),
            comment: field(&["comment", "COMM"]),
            genre: field(&["genre", "TCON"]),
            track: field(&["track", "TRCK"]),
        }
    }
}

// Servers nest these at different depths, so search the whole tree
fn first_match<'a>(properties: &'a Amf0Object, name: &str) -> Option<&'a Amf0Value> {
    properties.find_matching(name, 1).into_iter().next()
}

fn text(value: &Amf0Value) -> Option<String> {
    match *value {
        Amf0Value::Utf8String(ref x) => Some(x.clone()),
        Amf0Value::Number(x) => Some(x.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::status::StatusCode;

    fn string(value: &str) -> Amf0Value {
        Amf0Value::Utf8String(value.to_string())
    }

    #[test]
    fn harvests_metadata_fields() {
        let mut properties = Amf0Object::new();
        properties.insert("duration", Amf0Value::Number(215.5));
        properties.insert("AudioDataRate", Amf0Value::Number(128.0));
        properties.insert("videodatarate", Amf0Value::Number(0.0));
        properties.insert("datasize", Amf0Value::Number(3_450_000.0));
        properties.insert("audiocodecid", Amf0Value::Number(2.0));
        properties.insert("stereo", Amf0Value::Boolean(true));

        let values = vec![string("onMetaData"), Amf0Value::Object(properties)];
        let metadata = match StreamData::parse(&values) {
            Some(StreamData::MetaData(metadata)) => metadata,
            x => panic!("Expected metadata, got {:?}", x),
        };

        assert_eq!(metadata.duration_seconds, Some(215.5));
        assert_eq!(metadata.audio_bitrate_kbps, Some(128.0));
        assert_eq!(metadata.video_bitrate_kbps, Some(0.0));
        assert_eq!(metadata.total_size, Some(3_450_000));
        assert_eq!(metadata.audio_codec, Some("2".to_string()));
        assert_eq!(metadata.audio_is_stereo, Some(true));
        assert_eq!(metadata.video_width, None);
    }

    #[test]
    fn filesize_wins_over_datasize() {
        let mut properties = Amf0Object::new();
        properties.insert("datasize", Amf0Value::Number(10.0));
        properties.insert("filesize", Amf0Value::Number(20.0));

        let metadata = StreamMetadata::from_properties(&properties);
        assert_eq!(metadata.total_size, Some(20));
    }

    #[test]
    fn set_data_frame_prefix_is_skipped() {
        let mut properties = Amf0Object::new();
        properties.insert("width", Amf0Value::Number(1280.0));

        let values = vec![
            string("@setDataFrame"),
            string("onMetaData"),
            Amf0Value::Object(properties),
        ];

        match StreamData::parse(&values) {
            Some(StreamData::MetaData(metadata)) => assert_eq!(metadata.video_width, Some(1280)),
            x => panic!("Expected metadata, got {:?}", x),
        }
    }

    #[test]
    fn nested_metadata_is_found() {
        let mut inner = Amf0Object::new();
        inner.insert("duration", Amf0Value::Number(12.0));
        let mut outer = Amf0Object::new();
        outer.insert("info", Amf0Value::Object(inner));

        let metadata = StreamMetadata::from_properties(&outer);
        assert_eq!(metadata.duration_seconds, Some(12.0));
    }

    #[test]
    fn harvests_id3_fields() {
        let mut properties = Amf0Object::new();
        properties.insert("songName", string("Song"));
        properties.insert("TPE1", string("Artist"));
        properties.insert("album", string("Album"));
        properties.insert("year", string("1999"));
        properties.insert("track", Amf0Value::Number(4.0));

        let values = vec![string("onID3"), Amf0Value::Object(properties)];
        let tags = match StreamData::parse(&values) {
            Some(StreamData::Id3(tags)) => tags,
            x => panic!("Expected id3, got {:?}", x),
        };

        assert_eq!(tags.title, Some("Song".to_string()));
        assert_eq!(tags.artist, Some("Artist".to_string()));
        assert_eq!(tags.album, Some("Album".to_string()));
        assert_eq!(tags.year, Some("1999".to_string()));
        assert_eq!(tags.track, Some("4".to_string()));
        assert_eq!(tags.genre, None);
    }

    #[test]
    fn play_status_is_rerouted() {
        let mut properties = Amf0Object::new();
        properties.insert("code", string("NetStream.Play.Switch"));
        properties.insert("level", string("status"));

        let values = vec![string("onPlayStatus"), Amf0Value::Object(properties)];
        match StreamData::parse(&values) {
            Some(StreamData::Status(status)) => assert_eq!(status.code, StatusCode::PlaySwitch),
            x => panic!("Expected status, got {:?}", x),
        }
    }

    #[test]
    fn unknown_handlers_are_reported_by_name() {
        let values = vec![string("onCuePoint"), Amf0Value::Null];
        assert_eq!(
            StreamData::parse(&values),
            Some(StreamData::Other("onCuePoint".to_string()))
        );
    }

    #[test]
    fn non_string_first_value_is_ignored() {
        assert_eq!(StreamData::parse(&[Amf0Value::Number(1.0)]), None);
        assert_eq!(StreamData::parse(&[]), None);
    }
}
