use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::group::Group;
use crate::models::post::{Post, PostDetail};
use crate::services::content_service::PostInput;
use crate::services::media_service::UploadedImage;
use crate::services::paginator::{parse_page_number, Page};

/// `?page=` on every listing.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    pub fn number(&self) -> u64 {
        parse_page_number(self.page.as_deref())
    }
}

/// Urlencoded post form. `group` is the selected group id or empty,
/// `image` a base64 data URL or empty.
#[derive(Debug, Default, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub image: String,
}

impl PostForm {
    pub fn group_id(&self) -> Result<Option<i64>, String> {
        let group = self.group.trim();
        if group.is_empty() {
            return Ok(None);
        }
        group
            .parse::<i64>()
            .map(Some)
            .map_err(|_| "Select a valid choice.".to_string())
    }

    /// Parses the raw fields; service-level validation happens later.
    pub fn to_input(&self) -> Result<PostInput, (&'static str, String)> {
        let group_id = self.group_id().map_err(|m| ("group", m))?;
        let image = match self.image.trim() {
            "" => None,
            data => Some(UploadedImage::from_data_url(data).map_err(|e| ("image", e.to_string()))?),
        };
        Ok(PostInput {
            text: self.text.clone(),
            group_id,
            image,
        })
    }
}

/// Field values echoed back into a re-rendered form.
#[derive(Debug, Default, Serialize)]
pub struct PostFormValues {
    pub text: String,
    pub group: Option<i64>,
}

impl From<&Post> for PostFormValues {
    fn from(post: &Post) -> Self {
        Self {
            text: post.text.clone(),
            group: post.group_id,
        }
    }
}

impl From<&PostForm> for PostFormValues {
    fn from(form: &PostForm) -> Self {
        Self {
            text: form.text.clone(),
            group: form.group_id().ok().flatten(),
        }
    }
}

pub type FormErrors = BTreeMap<&'static str, Vec<String>>;

pub fn form_error(field: &'static str, message: String) -> FormErrors {
    let mut errors = FormErrors::new();
    errors.insert(field, vec![message]);
    errors
}

#[derive(Debug, Serialize)]
pub struct PostFormContext {
    pub is_edit: bool,
    pub post_id: Option<i64>,
    pub form: PostFormValues,
    pub errors: FormErrors,
    pub groups: Vec<Group>,
}

#[derive(Debug, Serialize)]
pub struct IndexContext {
    pub page_obj: Page<Post>,
}

#[derive(Debug, Serialize)]
pub struct GroupContext {
    pub group: Group,
    pub page_obj: Page<Post>,
}

#[derive(Debug, Serialize)]
pub struct FollowIndexContext {
    pub follow: bool,
    pub page_obj: Page<Post>,
}

#[derive(Debug, Serialize)]
pub struct PostDetailContext {
    #[serde(flatten)]
    pub detail: PostDetail,
    pub form: CommentFormValues,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Serialize)]
pub struct CommentFormValues {
    pub text: String,
}
