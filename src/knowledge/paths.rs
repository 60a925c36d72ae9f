/// RTSP live-stream paths, substream variants before their mainstream counterparts.
pub const RTSP_PATH_TEMPLATES: &[&str] = &[
    "/cam/realmonitor?channel=1&subtype=1",
    "/cam/realmonitor?channel=1&subtype=0",
    "/Streaming/Channels/102",
    "/Streaming/Channels/101",
    "/h264Preview_01_sub",
    "/h264Preview_01_main",
    "/stream2",
    "/stream1",
    "/axis-media/media.amp?resolution=640x360",
    "/axis-media/media.amp",
    "/videoSub",
    "/videoMain",
    "/live/ch01_1",
    "/live/ch00_0",
    "/onvif2",
    "/onvif1",
    "/11",
    "/live",
];

/// Short list tried by the playback RTSP fallback.
pub const RTSP_FALLBACK_PATHS: &[&str] = &[
    "/cam/realmonitor?channel=1&subtype=1",
    "/Streaming/Channels/102",
    "/h264Preview_01_sub",
    "/stream2",
    "/live",
];

/// Vendor HTTP locations of recording files. `{filename}` is substituted.
pub const RECORDING_PATH_TEMPLATES: &[&str] = &[
    "/recordings/{filename}",
    "/recording/{filename}",
    "/record/{filename}",
    "/NVR/record/{filename}",
    "/mnt/sd/{filename}",
    "/mnt/sdcard/{filename}",
    "/sd/{filename}",
    "/sdcard/{filename}",
    "/media/{filename}",
    "/video/{filename}",
    "/videos/{filename}",
    "/playback/{filename}",
    "/storage/{filename}",
    "/DCIM/{filename}",
];

/// Directories that commonly hold recordings. Used by listing-based search.
pub const RECORDING_DIRECTORIES: &[&str] = &[
    "/record",
    "/recordings",
    "/mnt/sd",
    "/sd",
    "/sdcard",
    "/media",
    "/video",
    "/DCIM",
];

/// Metadata keys that may carry a directly playable URL, in trust order.
pub const PLAYBACK_URL_KEYS: &[&str] = &[
    "replayUri",
    "playbackUrl",
    "playback_url",
    "streamUrl",
    "videoUrl",
    "video_url",
    "url",
    "uri",
    "downloadUrl",
    "download_url",
];

/// Metadata keys that may carry a download URL, in trust order.
pub const DOWNLOAD_URL_KEYS: &[&str] = &[
    "downloadUrl",
    "download_url",
    "fileUrl",
    "file_url",
    "url",
    "uri",
    "playbackUrl",
    "playback_url",
    "videoUrl",
    "video_url",
];

/// Metadata keys that may carry a device-relative file path.
pub const PATH_KEYS: &[&str] = &["path", "filePath", "file_path", "filepath"];

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "ts", "m3u8", "flv", "dav", "h264", "h265", "264", "265", "asf",
];

pub fn has_video_extension(path: &str) -> bool {
    let without_query = path.split(['?', '#']).next().unwrap_or(path);
    match without_query.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

pub fn fill_template(template: &str, filename: &str) -> String {
    template.replace("{filename}", filename.trim_start_matches('/'))
}

/// Leading entries of [`RTSP_PATH_TEMPLATES`] that form sub/main pairs.
const PAIRED_TEMPLATES: usize = 16;

/// RTSP templates ordered for the wanted stream: asking for the mainstream swaps each
/// sub/main pair.
pub fn rtsp_templates_for(mainstream: bool) -> Vec<&'static str> {
    let (paired, rest) = RTSP_PATH_TEMPLATES.split_at(PAIRED_TEMPLATES);
    let mut ordered = Vec::with_capacity(RTSP_PATH_TEMPLATES.len());
    for pair in paired.chunks(2) {
        if mainstream {
            ordered.extend(pair.iter().rev());
        } else {
            ordered.extend(pair);
        }
    }
    ordered.extend(rest);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substream_before_mainstream() {
        let sub = RTSP_PATH_TEMPLATES
            .iter()
            .position(|p| *p == "/cam/realmonitor?channel=1&subtype=1")
            .unwrap();
        let main = RTSP_PATH_TEMPLATES
            .iter()
            .position(|p| *p == "/cam/realmonitor?channel=1&subtype=0")
            .unwrap();
        assert!(sub < main);
    }

    #[test]
    fn test_mainstream_order_swaps_pairs() {
        let main = rtsp_templates_for(true);
        assert_eq!(main.len(), RTSP_PATH_TEMPLATES.len());
        assert_eq!(main[0], "/cam/realmonitor?channel=1&subtype=0");
        assert_eq!(main[1], "/cam/realmonitor?channel=1&subtype=1");
        assert_eq!(main[2], "/Streaming/Channels/101");
        assert_eq!(main.last(), Some(&"/live"));
        assert_eq!(rtsp_templates_for(false), RTSP_PATH_TEMPLATES.to_vec());
    }

    #[test]
    fn test_video_extension_detection() {
        assert!(has_video_extension("http://cam/thumbs/clip.MP4"));
        assert!(has_video_extension("/rec/a.dav?token=1"));
        assert!(!has_video_extension("http://cam/thumbs/clip.jpg"));
        assert!(!has_video_extension("http://cam.local/path"));
        assert!(!has_video_extension(".mp4"));
    }

    #[test]
    fn test_fill_template_strips_leading_slash() {
        assert_eq!(fill_template("/record/{filename}", "/a.mp4"), "/record/a.mp4");
    }
}
