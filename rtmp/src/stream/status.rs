use rtmpc_amf0::{Amf0Object, Amf0Value};

/// Code used for the status raised when `onMetaData` reveals the duration of the media
pub const METADATA_DURATION_CODE: &str = "NetStream.MetaData.Duration";

/// The `NetStream` status codes a playing stream reacts to.  Anything else is carried verbatim in
/// `Unhandled` so callers can still see it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusCode {
    PlayReset,
    PlayStart,
    PlayStop,
    PlaySwitch,
    PlayComplete,
    PlayTransitionComplete,
    PlayFailed,
    PlayStreamNotFound,
    PlayInsufficientBandwidth,
    PlayPublishNotify,
    PlayUnpublishNotify,
    SeekNotify,
    SeekFailed,
    PauseNotify,
    UnpauseNotify,
    BufferEmpty,
    BufferFull,
    BufferFlush,
    DataStart,
    Failed,

    /// Raised locally once `onMetaData` carries a duration
    MetaDataDuration,

    Unhandled(String),
}

impl StatusCode {
    pub fn parse(code: &str) -> StatusCode {
        match code {
            "NetStream.Play.Reset" => StatusCode::PlayReset,
            "NetStream.Play.Start" => StatusCode::PlayStart,
            "NetStream.Play.Stop" => StatusCode::PlayStop,
            "NetStream.Play.Switch" => StatusCode::PlaySwitch,
            "NetStream.Play.Complete" => StatusCode::PlayComplete,
            "NetStream.Play.TransitionComplete" => StatusCode::PlayTransitionComplete,
            "NetStream.Play.Failed" => StatusCode::PlayFailed,
            "NetStream.Play.StreamNotFound" => StatusCode::PlayStreamNotFound,
            "NetStream.Play.InsufficientBW" => StatusCode::PlayInsufficientBandwidth,
            "NetStream.Play.PublishNotify" => StatusCode::PlayPublishNotify,
            "NetStream.Play.UnpublishNotify" => StatusCode::PlayUnpublishNotify,
            "NetStream.Seek.Notify" => StatusCode::SeekNotify,
            "NetStream.Seek.Failed" => StatusCode::SeekFailed,
            "NetStream.Pause.Notify" => StatusCode::PauseNotify,
            "NetStream.Unpause.Notify" => StatusCode::UnpauseNotify,
            "NetStream.Buffer.Empty" => StatusCode::BufferEmpty,
            "NetStream.Buffer.Full" => StatusCode::BufferFull,
            "NetStream.Buffer.Flush" => StatusCode::BufferFlush,
            "NetStream.Data.Start" => StatusCode::DataStart,
            "NetStream.Failed" => StatusCode::Failed,
            METADATA_DURATION_CODE => StatusCode::MetaDataDuration,
            other => StatusCode::Unhandled(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match *self {
            StatusCode::PlayReset => "NetStream.Play.Reset",
            StatusCode::PlayStart => "NetStream.Play.Start",
            StatusCode::PlayStop => "NetStream.Play.Stop",
            StatusCode::PlaySwitch => "NetStream.Play.Switch",
            StatusCode::PlayComplete => "NetStream.Play.Complete",
            StatusCode::PlayTransitionComplete => "NetStream.Play.TransitionComplete",
            StatusCode::PlayFailed => "NetStream.Play.Failed",
            StatusCode::PlayStreamNotFound => "NetStream.Play.StreamNotFound",
            StatusCode::PlayInsufficientBandwidth => "NetStream.Play.InsufficientBW",
            StatusCode::PlayPublishNotify => "NetStream.Play.PublishNotify",
            StatusCode::PlayUnpublishNotify => "NetStream.Play.UnpublishNotify",
            StatusCode::SeekNotify => "NetStream.Seek.Notify",
            StatusCode::SeekFailed => "NetStream.Seek.Failed",
            StatusCode::PauseNotify => "NetStream.Pause.Notify",
            StatusCode::UnpauseNotify => "NetStream.Unpause.Notify",
            StatusCode::BufferEmpty => "NetStream.Buffer.Empty",
            StatusCode::BufferFull => "NetStream.Buffer.Full",
            StatusCode::BufferFlush => "NetStream.Buffer.Flush",
            StatusCode::DataStart => "NetStream.Data.Start",
            StatusCode::Failed => "NetStream.Failed",
            StatusCode::MetaDataDuration => METADATA_DURATION_CODE,
            StatusCode::Unhandled(ref code) => code.as_str(),
        }
    }
}

/// A decoded `onStatus` (or `onPlayStatus`) notification
#[derive(Clone, Debug, PartialEq)]
pub struct StreamStatus {
    pub code: StatusCode,
    pub level: String,
    pub description: String,

    /// The full info object, when the status came from the server
    pub info: Option<Amf0Object>,
}

impl StreamStatus {
    /// Builds a status from the info object of an `onStatus` call.  Returns `None` when the
    /// object has no `code` property.
    pub fn from_info(info: &Amf0Object) -> Option<StreamStatus> {
        let code = info.get_ignore_case("code").and_then(Amf0Value::as_str)?;
        let level = info
            .get_ignore_case("level")
            .and_then(Amf0Value::as_str)
            .unwrap_or("status");

        let description = info
            .get_ignore_case("description")
            .and_then(Amf0Value::as_str)
            .unwrap_or("");

        Some(StreamStatus {
            code: StatusCode::parse(code),
            level: level.to_string(),
            description: description.to_string(),
            info: Some(info.clone()),
        })
    }

    pub fn synthetic(code: StatusCode, description: String) -> StreamStatus {
        StreamStatus {
            code,
            level: "status".to_string(),
            description,
            info: None,
        }
    }

    /// True for the codes that mean the requested media will not play.  These are not fatal to
    /// the connection; callers typically move on to the next item.
    pub fn is_play_failure(&self) -> bool {
        match self.code {
            StatusCode::PlayFailed | StatusCode::PlayStreamNotFound | StatusCode::Failed => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_both_ways() {
        let codes = [
            "NetStream.Play.Reset",
            "NetStream.Play.Start",
            "NetStream.Play.Stop",
            "NetStream.Play.Switch",
            "NetStream.Seek.Notify",
            "NetStream.Pause.Notify",
            "NetStream.Unpause.Notify",
            "NetStream.Play.Failed",
            "NetStream.Play.StreamNotFound",
            "NetStream.Failed",
        ];

        for code in codes.iter() {
            let parsed = StatusCode::parse(code);
            assert_ne!(parsed, StatusCode::Unhandled(code.to_string()));
            assert_eq!(parsed.as_str(), *code);
        }
    }

    #[test]
    fn unknown_codes_are_unhandled() {
        let parsed = StatusCode::parse("NetStream.Something.New");
        assert_eq!(
            parsed,
            StatusCode::Unhandled("NetStream.Something.New".to_string())
        );
        assert_eq!(parsed.as_str(), "NetStream.Something.New");
    }

    #[test]
    fn status_is_read_from_info_object() {
        let mut info = Amf0Object::new();
        info.insert("level", Amf0Value::Utf8String("error".to_string()));
        info.insert(
            "Code",
            Amf0Value::Utf8String("NetStream.Play.StreamNotFound".to_string()),
        );
        info.insert("description", Amf0Value::Utf8String("nope".to_string()));

        let status = StreamStatus::from_info(&info).unwrap();
        assert_eq!(status.code, StatusCode::PlayStreamNotFound);
        assert_eq!(status.level, "error");
        assert_eq!(status.description, "nope");
        assert!(status.is_play_failure());
    }

    #[test]
    fn info_without_code_is_ignored() {
        let mut info = Amf0Object::new();
        info.insert("level", Amf0Value::Utf8String("status".to_string()));
        assert!(StreamStatus::from_info(&info).is_none());
    }

    #[test]
    fn start_is_not_a_failure() {
        let status = StreamStatus::synthetic(StatusCode::PlayStart, String::new());
        assert!(!status.is_play_failure());
    }
}
