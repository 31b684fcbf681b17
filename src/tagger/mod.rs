//! Writes song metadata into downloaded audio files.

use std::path::Path;

use lofty::config::WriteOptions;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::{Accessor, TagExt};
use lofty::tag::{ItemKey, ItemValue, Tag, TagItem, TagType};
use tracing::{debug, warn};

use crate::catalog::Lyrics;
use crate::cover::CoverArt;
use crate::download::SongInfo;

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("Failed to write tags: {0}")]
    Write(#[from] lofty::error::LoftyError),
}

/// The tag format for a file, by extension. `None` means we leave the
/// file untagged rather than guess.
fn tag_type_for(path: &Path) -> Option<TagType> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "flac" => Some(TagType::VorbisComments),
        "mp3" => Some(TagType::Id3v2),
        _ => None,
    }
}

/// Fill a tag with everything we know about the song.
///
/// Existing cover pictures are replaced, not appended to.
pub fn apply_tags(tag: &mut Tag, song: &SongInfo, lyrics: Option<&Lyrics>, cover: Option<&CoverArt>) {
    tag.set_title(song.name.clone());
    tag.set_artist(song.singers.clone());
    if !song.album.is_empty() {
        tag.set_album(song.album.clone());
    }

    if let Some(lyrics) = lyrics {
        if !lyrics.lyric.is_empty() {
            tag.insert(TagItem::new(
                ItemKey::Lyrics,
                ItemValue::Text(lyrics.lyric.clone()),
            ));
        }
        if !lyrics.trans.is_empty() {
            tag.push(TagItem::new(
                ItemKey::Lyrics,
                ItemValue::Text(lyrics.trans.clone()),
            ));
        }
    }

    if let Some(cover) = cover {
        let mime = if cover.url.to_ascii_lowercase().ends_with(".png") {
            MimeType::Png
        } else {
            MimeType::Jpeg
        };
        while !tag.pictures().is_empty() {
            tag.remove_picture(0);
        }
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(mime),
            None,
            cover.data.clone(),
        ));
    }
}

/// Tag the audio file at `path`. Returns `false` when the format has no
/// supported tag layout.
pub fn tag_file(
    path: &Path,
    song: &SongInfo,
    lyrics: Option<&Lyrics>,
    cover: Option<&CoverArt>,
) -> Result<bool, TagError> {
    let Some(tag_type) = tag_type_for(path) else {
        warn!("No supported tag format for {}, skipping metadata", path.display());
        return Ok(false);
    };

    let mut tag = Tag::new(tag_type);
    apply_tags(&mut tag, song, lyrics, cover);
    tag.save_to_path(path, WriteOptions::default())?;
    debug!("Wrote {:?} tags to {}", tag_type, path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn song() -> SongInfo {
        SongInfo {
            mid: "m1".to_string(),
            name: "Night Drive".to_string(),
            singers: "The Examples".to_string(),
            album: "First Light".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn tag_type_follows_extension() {
        assert_eq!(
            tag_type_for(&PathBuf::from("/m/a.flac")),
            Some(TagType::VorbisComments)
        );
        assert_eq!(tag_type_for(&PathBuf::from("/m/a.MP3")), Some(TagType::Id3v2));
        assert_eq!(tag_type_for(&PathBuf::from("/m/a.ogg")), None);
        assert_eq!(tag_type_for(&PathBuf::from("/m/noext")), None);
    }

    #[test]
    fn applies_basic_fields() {
        let mut tag = Tag::new(TagType::Id3v2);
        apply_tags(&mut tag, &song(), None, None);
        assert_eq!(tag.title().as_deref(), Some("Night Drive"));
        assert_eq!(tag.artist().as_deref(), Some("The Examples"));
        assert_eq!(tag.album().as_deref(), Some("First Light"));
        assert!(tag.pictures().is_empty());
    }

    #[test]
    fn empty_album_is_not_written() {
        let mut tag = Tag::new(TagType::VorbisComments);
        let mut s = song();
        s.album = String::new();
        apply_tags(&mut tag, &s, None, None);
        assert!(tag.album().is_none());
    }

    #[test]
    fn lyrics_and_translation_both_land_in_the_tag() {
        let mut tag = Tag::new(TagType::Id3v2);
        let lyrics = Lyrics {
            lyric: "[00:01.00]line one".to_string(),
            trans: "[00:01.00]translated".to_string(),
        };
        apply_tags(&mut tag, &song(), Some(&lyrics), None);
        let texts: Vec<_> = tag
            .get_items(&ItemKey::Lyrics)
            .filter_map(|item| item.value().text())
            .collect();
        assert_eq!(texts.len(), 2);
        assert!(texts.contains(&"[00:01.00]line one"));
        assert!(texts.contains(&"[00:01.00]translated"));
    }

    #[test]
    fn cover_replaces_existing_pictures() {
        let mut tag = Tag::new(TagType::Id3v2);
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Jpeg),
            None,
            vec![1, 2, 3],
        ));

        let cover = CoverArt {
            url: "https://cdn.example/cover.png".to_string(),
            data: vec![9, 9, 9],
        };
        apply_tags(&mut tag, &song(), None, Some(&cover));

        assert_eq!(tag.pictures().len(), 1);
        assert_eq!(tag.pictures()[0].data(), &[9, 9, 9]);
        assert_eq!(tag.pictures()[0].mime_type(), Some(&MimeType::Png));
    }

    #[test]
    fn cover_mime_ignores_url_case() {
        let mut tag = Tag::new(TagType::Id3v2);
        let cover = CoverArt {
            url: "https://cdn.example/COVER.PNG".to_string(),
            data: vec![4, 5, 6],
        };
        apply_tags(&mut tag, &song(), None, Some(&cover));
        assert_eq!(tag.pictures()[0].mime_type(), Some(&MimeType::Png));
    }
}
