/// The first video media section of a session description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTrack {
    /// `a=control` value, `*` when absent
    pub control: String,
    pub payload_type: Option<u8>,
    /// Encoding name from `a=rtpmap`, e.g. `H264`
    pub codec: Option<String>,
    pub clock_rate: Option<u32>,
}

pub fn find_video_track(sdp: &str) -> Option<VideoTrack> {
    let mut track: Option<VideoTrack> = None;

    for line in sdp.lines().map(str::trim) {
        if let Some(media) = line.strip_prefix("m=") {
            if track.is_some() {
                break;
            }
            let mut fields = media.split_whitespace();
            if fields.next() == Some("video") {
                track = Some(VideoTrack {
                    control: "*".to_string(),
                    payload_type: fields.nth(2).and_then(|pt| pt.parse().ok()),
                    codec: None,
                    clock_rate: None,
                });
            }
            continue;
        }

        let Some(current) = track.as_mut() else {
            continue;
        };

        if let Some(control) = line.strip_prefix("a=control:") {
            current.control = control.trim().to_string();
        } else if let Some(rtpmap) = line.strip_prefix("a=rtpmap:") {
            let Some((pt, encoding)) = rtpmap.split_once(' ') else {
                continue;
            };
            if pt.trim().parse::<u8>().ok() != current.payload_type {
                continue;
            }
            let mut parts = encoding.trim().split('/');
            current.codec = parts.next().map(str::to_string);
            current.clock_rate = parts.next().and_then(|rate| rate.parse().ok());
        }
    }

    track
}

/// Absolute URI for a media-level control attribute
pub fn resolve_control(base: &str, control: &str) -> String {
    if control == "*" || control.is_empty() {
        return base.to_string();
    }
    if control.starts_with("rtsp://") || control.starts_with("rtsps://") {
        return control.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        control.trim_start_matches('/')
    )
}
