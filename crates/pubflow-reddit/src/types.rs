//! Wire types for the Reddit listing API, reduced to the fields the
//! pipeline reads.

use serde::Deserialize;

/// One post from a subreddit listing, normalised for the collect stage.
#[derive(Debug, Clone)]
pub struct RawPost {
    /// Stable id from the origin system (`t3_`-prefixed fullname).
    pub id: String,
    pub title: String,
    pub body: String,
    pub media_urls: Vec<String>,
    pub score: i64,
    pub comment_count: i64,
    pub nsfw: bool,
}

/// One page of listing results plus the cursor for the next page.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub posts: Vec<RawPost>,
    pub after: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Listing {
    pub(crate) data: ListingData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListingData {
    pub(crate) children: Vec<Post>,
    pub(crate) after: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Post {
    pub(crate) data: PostData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostData {
    pub(crate) name: Option<String>,
    pub(crate) id: Option<String>,
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) selftext: String,
    pub(crate) url_overridden_by_dest: Option<String>,
    #[serde(default)]
    pub(crate) preview: Option<Preview>,
    #[serde(default)]
    pub(crate) score: i64,
    #[serde(default)]
    pub(crate) num_comments: i64,
    #[serde(default)]
    pub(crate) over_18: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Preview {
    #[serde(default)]
    pub(crate) images: Vec<PreviewImage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PreviewImage {
    pub(crate) source: Option<PreviewSource>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PreviewSource {
    pub(crate) url: Option<String>,
}

impl PostData {
    /// Normalise one listing child into a [`RawPost`]; posts without an id
    /// or title are dropped.
    pub(crate) fn into_raw_post(self) -> Option<RawPost> {
        let id = self.name.or(self.id)?;
        let title = self.title?;

        let mut media_urls: Vec<String> = Vec::new();
        if let Some(url) = self.url_overridden_by_dest {
            media_urls.push(url);
        }
        if let Some(preview) = self.preview {
            for image in preview.images {
                if let Some(url) = image.source.and_then(|s| s.url) {
                    media_urls.push(url);
                }
            }
        }

        Some(RawPost {
            id,
            title,
            body: self.selftext,
            media_urls,
            score: self.score,
            comment_count: self.num_comments,
            nsfw: self.over_18,
        })
    }
}
