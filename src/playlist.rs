use crate::{rules::RuleSet, *};
use std::{io::Write, path::Path};

/// One meaningful line of a playlist file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistLine {
    /// A path to a media file, relative to the relocation root.
    Entry(String),
    /// An extended M3U directive or comment (`#EXTM3U`, `#EXTINF:...`).
    /// Copied to the rewritten playlist verbatim, never synced.
    Directive(String),
}

/// Read a playlist: lines are trimmed and blank lines dropped.
pub fn read_playlist(path: &Path) -> Result<Vec<PlaylistLine>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read playlist {}", path.display()))?;

    Ok(parse_playlist(&contents))
}

pub fn parse_playlist(contents: &str) -> Vec<PlaylistLine> {
    contents
        .lines()
        // A UTF-8 BOM sometimes precedes the first line of exported playlists.
        .map(|line| line.trim_start_matches('\u{feff}').trim())
        .filter(|line| !line.is_empty())
        .map(|line| {
            if line.starts_with('#') {
                PlaylistLine::Directive(line.to_string())
            } else {
                PlaylistLine::Entry(line.to_string())
            }
        })
        .collect()
}

/// Maps source playlist entries to their destination-side form.
pub struct PlaylistRewriter<'a> {
    rules: &'a RuleSet,
    prefix: Option<&'a str>,
}

impl<'a> PlaylistRewriter<'a> {
    pub fn new(rules: &'a RuleSet, prefix: Option<&'a str>) -> Self {
        Self { rules, prefix }
    }

    /// Swap the extension for converted files and prepend the prefix.
    pub fn rewrite(&self, line: &str) -> String {
        let path = self.rules.rewrite(line);
        match self.prefix {
            Some(prefix) => format!("{prefix}{path}"),
            None => path.into_owned(),
        }
    }

    pub fn rewrite_line(&self, line: &PlaylistLine) -> String {
        match line {
            PlaylistLine::Entry(entry) => self.rewrite(entry),
            PlaylistLine::Directive(directive) => directive.clone(),
        }
    }
}

/// Write a rewritten playlist, one newline-terminated line per entry,
/// overwriting any previous content.
pub fn write_playlist(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create playlist directory {}", parent.display()))?;
    }

    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create playlist {}", path.display()))?;
    for line in lines {
        writeln!(file, "{line}")
            .with_context(|| format!("Failed to write playlist {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rules::ConversionRule;

    fn flac_to_mp3() -> RuleSet {
        RuleSet::new(vec![ConversionRule {
            extension: ".flac".into(),
            output_extension: ".mp3".into(),
            command: vec!["conv".into(), "{source}".into(), "{output}".into()],
            staging: None,
        }])
        .unwrap()
    }

    #[test]
    fn test_parse_playlist() {
        let lines = parse_playlist("#EXTM3U\nartist/a.flac  \n\n   \n  artist/b.mp3\r\n\tartist/a.flac\n");
        assert_eq!(
            lines,
            vec![
                PlaylistLine::Directive("#EXTM3U".into()),
                PlaylistLine::Entry("artist/a.flac".into()),
                PlaylistLine::Entry("artist/b.mp3".into()),
                PlaylistLine::Entry("artist/a.flac".into()),
            ]
        );
    }

    #[test]
    fn test_rewrite_without_prefix() {
        let rules = flac_to_mp3();
        let rewriter = PlaylistRewriter::new(&rules, None);
        assert_eq!(rewriter.rewrite("artist/song1.flac"), "artist/song1.mp3");
        assert_eq!(rewriter.rewrite("artist/song2.ogg"), "artist/song2.ogg");
    }

    #[test]
    fn test_rewrite_with_prefix() {
        let rules = flac_to_mp3();
        let rewriter = PlaylistRewriter::new(&rules, Some("/sdcard/Music/"));
        assert_eq!(rewriter.rewrite("a/x.FLAC"), "/sdcard/Music/a/x.mp3");
        assert_eq!(rewriter.rewrite("a/y.ogg"), "/sdcard/Music/a/y.ogg");
        assert_eq!(
            rewriter.rewrite_line(&PlaylistLine::Directive("#EXTINF:1,x".into())),
            "#EXTINF:1,x"
        );
    }

    #[test]
    fn test_write_playlist_preserves_order_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("A.m3u");

        let lines = vec!["b.mp3".to_string(), "a.mp3".to_string(), "b.mp3".to_string()];
        write_playlist(&path, &lines).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "b.mp3\na.mp3\nb.mp3\n");

        write_playlist(&path, &lines[..1]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "b.mp3\n");
    }

    #[test]
    fn test_missing_playlist_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_playlist(&dir.path().join("missing.m3u")).is_err());
    }
}
