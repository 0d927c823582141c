//! Key layout and result type for published composites.

use chrono::Datelike;

use crate::error::{StorageError, StorageResult};

/// Content type of every published composite.
pub const COMPOSITE_CONTENT_TYPE: &str = "video/mp4";

/// A composite stored in the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedAsset {
    /// Public URL of the object
    pub url: String,
    /// Identifier the caller chose (prefix + job id)
    pub public_id: String,
    /// Object key
    pub key: String,
    /// Uploaded size in bytes
    pub bytes: u64,
}

/// `<base>/<YYYY>/<MM>/<DD>` for the given date.
pub fn dated_folder(base: &str, date: impl Datelike) -> String {
    let base = base.trim_matches('/');
    let dated = format!("{:04}/{:02}/{:02}", date.year(), date.month(), date.day());
    if base.is_empty() {
        dated
    } else {
        format!("{}/{}", base, dated)
    }
}

/// Object key for a composite: `<folder>/<public_id>.mp4`.
pub fn object_key(folder: &str, public_id: &str) -> StorageResult<String> {
    let public_id = public_id.trim();
    if public_id.is_empty() {
        return Err(StorageError::invalid_key("public id is empty"));
    }
    if public_id.contains('/') || public_id.contains("..") {
        return Err(StorageError::invalid_key(format!(
            "public id must be a single path segment: {}",
            public_id
        )));
    }

    let folder = folder.trim_matches('/');
    if folder.split('/').any(|segment| segment == "..") {
        return Err(StorageError::invalid_key(format!(
            "folder may not traverse upwards: {}",
            folder
        )));
    }

    Ok(if folder.is_empty() {
        format!("{}.mp4", public_id)
    } else {
        format!("{}/{}.mp4", folder, public_id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_dated_folder() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(dated_folder("reelmix/composites", date), "reelmix/composites/2024/03/09");
        assert_eq!(dated_folder("/reels/", date), "reels/2024/03/09");
        assert_eq!(dated_folder("", date), "2024/03/09");
    }

    #[test]
    fn test_object_key() {
        assert_eq!(
            object_key("reels/2024/03/09", "promo_abc").unwrap(),
            "reels/2024/03/09/promo_abc.mp4"
        );
        assert_eq!(object_key("", "abc").unwrap(), "abc.mp4");
    }

    #[test]
    fn test_object_key_rejects_bad_ids() {
        assert!(object_key("reels", "").is_err());
        assert!(object_key("reels", "a/b").is_err());
        assert!(object_key("reels/../secret", "abc").is_err());
    }
}
