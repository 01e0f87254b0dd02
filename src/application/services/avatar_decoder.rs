//! Extraction of the avatar embedded in a `vcard-temp` document.
//!
//! Everything here operates on attacker-controlled input and reports every
//! failure as a [`DecodeError`]; nothing in this module can panic.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use minidom::Element;

use crate::domain::entities::{DecodedAvatar, ImageExtension};
use crate::domain::errors::DecodeError;

/// Namespace of XEP-0054 vCards.
pub const VCARD_NS: &str = "vcard-temp";

/// Standard alphabet; padding is optional because some clients strip it.
const BINVAL_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// What to do when `PHOTO` carries no `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MimePolicy {
    /// Refuse the avatar with [`DecodeError::UnknownFormat`].
    #[default]
    Require,
    /// Assume `image/png` (the `guess_type` configuration option).
    AssumePng,
}

impl MimePolicy {
    #[must_use]
    pub const fn from_guess_type(guess_type: bool) -> Self {
        if guess_type {
            Self::AssumePng
        } else {
            Self::Require
        }
    }
}

/// Decodes the avatar carried by `profile`.
///
/// # Errors
///
/// Returns the first failing step: missing vCard, missing photo data,
/// missing or unsupported MIME type, then malformed base64.
pub fn decode_avatar(
    profile: Option<&Element>,
    policy: MimePolicy,
) -> Result<DecodedAvatar, DecodeError> {
    let vcard = profile.ok_or(DecodeError::NoProfile)?;
    let photo = vcard
        .get_child("PHOTO", VCARD_NS)
        .ok_or(DecodeError::NoAvatar)?;

    let encoded = photo
        .get_child("BINVAL", VCARD_NS)
        .map(|binval| strip_whitespace(&binval.text()))
        .filter(|encoded| !encoded.is_empty())
        .ok_or(DecodeError::NoAvatar)?;

    let declared = photo
        .get_child("TYPE", VCARD_NS)
        .map(Element::text)
        .filter(|mime| !mime.trim().is_empty());

    let mime = match (declared, policy) {
        (Some(mime), _) => mime,
        (None, MimePolicy::AssumePng) => ImageExtension::Png.mime_type().to_string(),
        (None, MimePolicy::Require) => return Err(DecodeError::UnknownFormat),
    };

    let extension =
        ImageExtension::from_mime(&mime).ok_or_else(|| DecodeError::unsupported(mime.trim()))?;

    let bytes = BINVAL_ENGINE
        .decode(encoded.as_bytes())
        .map_err(|e| DecodeError::corrupt(e.to_string()))?;

    Ok(DecodedAvatar::new(bytes, extension))
}

/// Encoders wrap BINVAL at 76 columns; drop every ASCII whitespace byte.
fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use test_case::test_case;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 13];

    fn vcard(photo: &str) -> Element {
        format!("<vCard xmlns='vcard-temp'>{photo}</vCard>")
            .parse()
            .unwrap()
    }

    fn wrapped(bytes: &[u8], width: usize) -> String {
        let encoded = STANDARD.encode(bytes);
        encoded
            .as_bytes()
            .chunks(width)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_decodes_wrapped_png() {
        let doc = vcard(&format!(
            "<PHOTO><TYPE>image/png</TYPE><BINVAL>\n{}\n</BINVAL></PHOTO>",
            wrapped(PNG_HEADER, 4)
        ));

        let avatar = decode_avatar(Some(&doc), MimePolicy::Require).unwrap();
        assert_eq!(avatar.extension, ImageExtension::Png);
        assert_eq!(&avatar.bytes[..], PNG_HEADER);
    }

    #[test]
    fn test_strips_crlf_and_tabs() {
        // "R0lGODlh" is GIF89a
        let doc = vcard("<PHOTO><TYPE>image/gif</TYPE><BINVAL>R0lG\r\n\tOD lh</BINVAL></PHOTO>");

        let avatar = decode_avatar(Some(&doc), MimePolicy::Require).unwrap();
        assert_eq!(avatar.extension, ImageExtension::Gif);
        assert_eq!(&avatar.bytes[..], b"GIF89a");
    }

    #[test]
    fn test_accepts_unpadded_payload() {
        let doc = vcard("<PHOTO><TYPE>image/jpeg</TYPE><BINVAL>/9j/4A</BINVAL></PHOTO>");
        let avatar = decode_avatar(Some(&doc), MimePolicy::Require).unwrap();
        assert_eq!(avatar.extension, ImageExtension::Jpg);
        assert_eq!(&avatar.bytes[..], &[0xff, 0xd8, 0xff, 0xe0]);
    }

    #[test]
    fn test_missing_profile() {
        assert_eq!(
            decode_avatar(None, MimePolicy::AssumePng),
            Err(DecodeError::NoProfile)
        );
    }

    #[test_case("" ; "no_photo")]
    #[test_case("<PHOTO><TYPE>image/png</TYPE></PHOTO>" ; "no_binval")]
    #[test_case("<PHOTO><TYPE>image/png</TYPE><BINVAL>  \n </BINVAL></PHOTO>" ; "blank_binval")]
    #[test_case("<PHOTO><EXTVAL>https://example.org/a.png</EXTVAL></PHOTO>" ; "external_photo")]
    fn test_no_avatar(photo: &str) {
        let doc = vcard(photo);
        assert_eq!(
            decode_avatar(Some(&doc), MimePolicy::Require),
            Err(DecodeError::NoAvatar)
        );
    }

    #[test]
    fn test_missing_type_is_unknown_format() {
        let doc = vcard("<PHOTO><BINVAL>iVBORw0KGgo=</BINVAL></PHOTO>");
        assert_eq!(
            decode_avatar(Some(&doc), MimePolicy::Require),
            Err(DecodeError::UnknownFormat)
        );
    }

    #[test]
    fn test_blank_type_is_unknown_format() {
        let doc = vcard("<PHOTO><TYPE> </TYPE><BINVAL>iVBORw0KGgo=</BINVAL></PHOTO>");
        assert_eq!(
            decode_avatar(Some(&doc), MimePolicy::Require),
            Err(DecodeError::UnknownFormat)
        );
    }

    #[test]
    fn test_missing_type_guessed_as_png() {
        let doc = vcard("<PHOTO><BINVAL>iVBORw0KGgo=</BINVAL></PHOTO>");
        let avatar = decode_avatar(Some(&doc), MimePolicy::AssumePng).unwrap();
        assert_eq!(avatar.extension, ImageExtension::Png);
        assert_eq!(&avatar.bytes[..], &PNG_HEADER[..8]);
    }

    #[test_case("image/webp" ; "webp")]
    #[test_case("image/x-ms-bmp" ; "bmp")]
    #[test_case("text/html" ; "html")]
    #[test_case("image/png; charset=binary" ; "parameters")]
    fn test_unsupported_format_carries_mime(mime: &str) {
        let doc = vcard(&format!(
            "<PHOTO><TYPE>{mime}</TYPE><BINVAL>iVBORw0KGgo=</BINVAL></PHOTO>"
        ));
        assert_eq!(
            decode_avatar(Some(&doc), MimePolicy::AssumePng),
            Err(DecodeError::unsupported(mime))
        );
    }

    #[test_case("!!!!" ; "bad_alphabet")]
    #[test_case("iVBORw0KGgo=extra" ; "data_after_padding")]
    #[test_case("a" ; "truncated")]
    fn test_corrupt_payload(binval: &str) {
        let doc = vcard(&format!(
            "<PHOTO><TYPE>image/png</TYPE><BINVAL>{binval}</BINVAL></PHOTO>"
        ));
        assert!(matches!(
            decode_avatar(Some(&doc), MimePolicy::Require),
            Err(DecodeError::CorruptPayload { .. })
        ));
    }

    #[test]
    fn test_photo_in_foreign_namespace_is_ignored() {
        let doc: Element = "<vCard xmlns='vcard-temp'><PHOTO xmlns='urn:other'><TYPE>image/png</TYPE><BINVAL>iVBORw0KGgo=</BINVAL></PHOTO></vCard>"
            .parse()
            .unwrap();
        assert_eq!(
            decode_avatar(Some(&doc), MimePolicy::Require),
            Err(DecodeError::NoAvatar)
        );
    }
}
