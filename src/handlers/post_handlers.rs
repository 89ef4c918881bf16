// src/handlers/post_handlers.rs
use actix_web::{get, post, web, HttpResponse};
use log::{debug, warn};

use crate::dtos::post_dtos::{
    form_error, CommentForm, CommentFormValues, FormErrors, GroupContext, IndexContext,
    PageQuery, PostDetailContext, PostForm, PostFormContext, PostFormValues,
};
use crate::handlers::{not_found, post_url, profile_url, redirect, render, render_invalid};
use crate::middleware::auth_extractor::AuthenticatedUser;
use crate::services::content_service::ContentError;
use crate::services::media_service::content_type_for;
use crate::AppState;

type HandlerResult = Result<HttpResponse, ContentError>;

/// GET /
/// Newest posts, served from the short-lived index cache.
#[get("/")]
pub async fn index(app_state: web::Data<AppState>, query: web::Query<PageQuery>) -> HandlerResult {
    let page_obj = app_state.content.index_page(query.number()).await?;
    Ok(render("Posts retrieved successfully", IndexContext { page_obj }))
}

/// GET /group/{slug}/
#[get("/group/{slug}/")]
pub async fn group_posts(
    app_state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> HandlerResult {
    let slug = path.into_inner();
    let (group, page_obj) = app_state.content.group_page(&slug, query.number()).await?;
    Ok(render("Group posts retrieved successfully", GroupContext { group, page_obj }))
}

/// GET /posts/{post_id}/
#[get("/posts/{post_id}/")]
pub async fn post_detail(app_state: web::Data<AppState>, path: web::Path<i64>) -> HandlerResult {
    let detail = app_state.content.get_post(path.into_inner()).await?;
    Ok(render(
        "Post retrieved successfully",
        PostDetailContext {
            detail,
            form: CommentFormValues::default(),
        },
    ))
}

async fn render_post_form(
    app_state: &AppState,
    post_id: Option<i64>,
    form: PostFormValues,
    errors: FormErrors,
) -> HandlerResult {
    let context = PostFormContext {
        is_edit: post_id.is_some(),
        post_id,
        form,
        groups: app_state.content.list_groups().await?,
        errors,
    };
    if context.errors.is_empty() {
        Ok(render("Post form", context))
    } else {
        Ok(render_invalid("Please correct the errors below", context))
    }
}

/// GET /create/
#[get("/create/")]
pub async fn create_form(app_state: web::Data<AppState>, _user: AuthenticatedUser) -> HandlerResult {
    render_post_form(&app_state, None, PostFormValues::default(), FormErrors::new()).await
}

/// POST /create/
/// Redirects to the author's profile on success.
#[post("/create/")]
pub async fn create_post(
    app_state: web::Data<AppState>,
    user: AuthenticatedUser,
    form: web::Form<PostForm>,
) -> HandlerResult {
    let form = form.into_inner();
    let input = match form.to_input() {
        Ok(input) => input,
        Err((field, message)) => {
            return render_post_form(&app_state, None, (&form).into(), form_error(field, message)).await;
        }
    };

    match app_state.content.create_post(user.user_id, input).await {
        Ok(_) => Ok(redirect(profile_url(&user.username))),
        Err(ContentError::Validation { field, message }) => {
            debug!("Rejected post from {}: {}", user.username, message);
            render_post_form(&app_state, None, (&form).into(), form_error(field, message)).await
        }
        Err(e) => Err(e),
    }
}

/// GET /posts/{post_id}/edit/
/// Non-authors are sent back to the post.
#[get("/posts/{post_id}/edit/")]
pub async fn edit_form(
    app_state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> HandlerResult {
    let post_id = path.into_inner();
    let detail = app_state.content.get_post(post_id).await?;
    if detail.post.author_id != user.user_id {
        return Ok(redirect(post_url(post_id)));
    }
    render_post_form(&app_state, Some(post_id), (&detail.post).into(), FormErrors::new()).await
}

/// POST /posts/{post_id}/edit/
#[post("/posts/{post_id}/edit/")]
pub async fn edit_post(
    app_state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    form: web::Form<PostForm>,
) -> HandlerResult {
    let post_id = path.into_inner();
    let detail = app_state.content.get_post(post_id).await?;
    if detail.post.author_id != user.user_id {
        warn!("User {} is not the author of post {}", user.username, post_id);
        return Ok(redirect(post_url(post_id)));
    }

    let form = form.into_inner();
    let input = match form.to_input() {
        Ok(input) => input,
        Err((field, message)) => {
            return render_post_form(&app_state, Some(post_id), (&form).into(), form_error(field, message))
                .await;
        }
    };

    match app_state.content.edit_post(post_id, user.user_id, input).await {
        Ok(_) | Err(ContentError::Forbidden) => Ok(redirect(post_url(post_id))),
        Err(ContentError::Validation { field, message }) => {
            render_post_form(&app_state, Some(post_id), (&form).into(), form_error(field, message)).await
        }
        Err(e) => Err(e),
    }
}

/// POST /posts/{post_id}/delete/
#[post("/posts/{post_id}/delete/")]
pub async fn delete_post(
    app_state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> HandlerResult {
    let post_id = path.into_inner();
    match app_state.content.delete_post(post_id, user.user_id).await {
        Ok(()) => Ok(redirect(profile_url(&user.username))),
        Err(ContentError::Forbidden) => Ok(redirect(post_url(post_id))),
        Err(e) => Err(e),
    }
}

/// POST /posts/{post_id}/comment/
/// Always lands back on the post; an empty comment is dropped.
#[post("/posts/{post_id}/comment/")]
pub async fn add_comment(
    app_state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    form: web::Form<CommentForm>,
) -> HandlerResult {
    let post_id = path.into_inner();
    match app_state.content.add_comment(post_id, user.user_id, &form.text).await {
        Ok(_) => {}
        Err(ContentError::Validation { message, .. }) => {
            debug!("Comment by {} on post {} dropped: {}", user.username, post_id, message);
        }
        Err(e) => return Err(e),
    }
    Ok(redirect(post_url(post_id)))
}

/// GET /media/posts/{filename}
#[get("/media/posts/{filename}")]
pub async fn serve_post_image(
    app_state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    let filename = path.into_inner();
    let Some(file_path) = app_state.content.media().post_image_path(&filename) else {
        return not_found(req).await;
    };

    match tokio::fs::read(&file_path).await {
        Ok(data) => HttpResponse::Ok()
            .content_type(content_type_for(&filename))
            .body(data),
        Err(_) => not_found(req).await,
    }
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::Value;

    use crate::handlers::test_support::{auth_header, location, test_app, test_state};
    use crate::models::group::NewGroup;
    use crate::models::user::User;
    use crate::services::content_service::PostInput;

    fn input(text: &str) -> PostInput {
        PostInput {
            text: text.to_string(),
            ..PostInput::default()
        }
    }

    #[actix_web::test]
    async fn index_lists_newest_posts() {
        let state = test_state();
        let author = state.content.register_user("Test_author").await.unwrap();
        state.content.create_post(author.id, input("older")).await.unwrap();
        state.content.create_post(author.id, input("newer")).await.unwrap();
        let app = test_app!(state);

        let body: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["page_obj"]["items"][0]["text"], "newer");
        assert_eq!(body["data"]["page_obj"]["items"][0]["author"], "Test_author");
    }

    #[actix_web::test]
    async fn listings_paginate_by_ten() {
        let state = test_state();
        let author = state.content.register_user("Test_author").await.unwrap();
        let group = state
            .content
            .create_group(&NewGroup {
                title: "Test group".to_string(),
                slug: "test-slug".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        for i in 0..13 {
            let mut post = input(&format!("Post #{}", i));
            post.group_id = Some(group.id);
            state.content.create_post(author.id, post).await.unwrap();
        }
        let app = test_app!(state);

        for uri in ["/", "/group/test-slug/", "/profile/Test_author/"] {
            let first: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(first["data"]["page_obj"]["items"].as_array().unwrap().len(), 10, "{}", uri);

            let second: Value = test::call_and_read_body_json(
                &app,
                test::TestRequest::get().uri(&format!("{}?page=2", uri)).to_request(),
            )
            .await;
            assert_eq!(second["data"]["page_obj"]["items"].as_array().unwrap().len(), 3, "{}", uri);
            assert_eq!(second["data"]["page_obj"]["has_previous"], true);
        }
    }

    #[actix_web::test]
    async fn unknown_group_post_and_route_are_404() {
        let state = test_state();
        let app = test_app!(state);

        for uri in ["/group/missing/", "/posts/12345/", "/posts/abc/", "/unexisting_page/"] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn anonymous_create_redirects_to_login() {
        let state = test_state();
        let app = test_app!(state);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/create/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "/auth/login/?next=%2Fcreate%2F");

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/create/")
                .set_form([("text", "sneaky")])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert!(location(&resp).starts_with("/auth/login/"));
        assert!(state.content.index_page(1).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn create_form_lists_groups() {
        let state = test_state();
        let author = state.content.register_user("Test_author").await.unwrap();
        state
            .content
            .create_group(&NewGroup {
                title: "Test group".to_string(),
                slug: "test-slug".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        let app = test_app!(state);

        let body: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/create/")
                .insert_header(auth_header(&author))
                .to_request(),
        )
        .await;
        assert_eq!(body["data"]["is_edit"], false);
        assert_eq!(body["data"]["groups"][0]["slug"], "test-slug");
    }

    #[actix_web::test]
    async fn create_redirects_to_profile() {
        let state = test_state();
        let author = state.content.register_user("Test_author").await.unwrap();
        let app = test_app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/create/")
                .insert_header(auth_header(&author))
                .set_form([("text", "New post text"), ("group", "")])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "/profile/Test_author/");

        let profile = state.content.profile_page("Test_author", None, 1).await.unwrap();
        assert_eq!(profile.page.items[0].text, "New post text");
    }

    #[actix_web::test]
    async fn first_request_from_session_user_can_post() {
        let state = test_state();
        let alice = User {
            id: 42,
            username: "alice".to_string(),
        };
        let app = test_app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/create/")
                .insert_header(auth_header(&alice))
                .set_form([("text", "Hello from alice")])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "/profile/alice/");

        let profile: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/profile/alice/").to_request(),
        )
        .await;
        assert_eq!(profile["data"]["author"]["id"], 42);
        assert_eq!(profile["data"]["page_obj"]["items"][0]["text"], "Hello from alice");
    }

    #[actix_web::test]
    async fn overlong_post_rerenders_form_with_errors() {
        let state = test_state();
        let author = state.content.register_user("Test_author").await.unwrap();
        let app = test_app!(state);
        let text = "x".repeat(256);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/create/")
                .insert_header(auth_header(&author))
                .set_form([("text", text.as_str())])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert!(body["data"]["errors"]["text"][0].is_string());
        assert_eq!(body["data"]["form"]["text"], text);
        assert_eq!(state.content.profile_page("Test_author", None, 1).await.unwrap().posts_count, 0);
    }

    #[actix_web::test]
    async fn non_author_edit_redirects_and_leaves_post_unchanged() {
        let state = test_state();
        let author = state.content.register_user("Test_author").await.unwrap();
        let other = state.content.register_user("another_user").await.unwrap();
        let post = state.content.create_post(author.id, input("original")).await.unwrap();
        let app = test_app!(state);
        let edit_uri = format!("/posts/{}/edit/", post.id);

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&edit_uri)
                .insert_header(auth_header(&other))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), format!("/posts/{}/", post.id));

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&edit_uri)
                .insert_header(auth_header(&other))
                .set_form([("text", "hijacked")])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), format!("/posts/{}/", post.id));
        assert_eq!(state.content.get_post(post.id).await.unwrap().post.text, "original");
    }

    #[actix_web::test]
    async fn author_edit_redirects_to_detail() {
        let state = test_state();
        let author = state.content.register_user("Test_author").await.unwrap();
        let post = state.content.create_post(author.id, input("original")).await.unwrap();
        let app = test_app!(state);
        let edit_uri = format!("/posts/{}/edit/", post.id);

        let form: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri(&edit_uri)
                .insert_header(auth_header(&author))
                .to_request(),
        )
        .await;
        assert_eq!(form["data"]["is_edit"], true);
        assert_eq!(form["data"]["form"]["text"], "original");

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&edit_uri)
                .insert_header(auth_header(&author))
                .set_form([("text", "edited")])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), format!("/posts/{}/", post.id));
        assert_eq!(state.content.get_post(post.id).await.unwrap().post.text, "edited");
    }

    #[actix_web::test]
    async fn comment_is_added_and_shown_on_detail() {
        let state = test_state();
        let author = state.content.register_user("Test_author").await.unwrap();
        let reader = state.content.register_user("another_user").await.unwrap();
        let post = state.content.create_post(author.id, input("post")).await.unwrap();
        let app = test_app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/posts/{}/comment/", post.id))
                .insert_header(auth_header(&reader))
                .set_form([("text", "Test comment")])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), format!("/posts/{}/", post.id));

        let body: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri(&format!("/posts/{}/", post.id)).to_request(),
        )
        .await;
        assert_eq!(body["data"]["comments_count"], 1);
        assert_eq!(body["data"]["comments"][0]["text"], "Test comment");
        assert_eq!(body["data"]["author_posts_count"], 1);
    }

    #[actix_web::test]
    async fn empty_comment_is_dropped() {
        let state = test_state();
        let author = state.content.register_user("Test_author").await.unwrap();
        let post = state.content.create_post(author.id, input("post")).await.unwrap();
        let app = test_app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/posts/{}/comment/", post.id))
                .insert_header(auth_header(&author))
                .set_form([("text", "   ")])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(state.content.get_post(post.id).await.unwrap().comments_count, 0);
    }

    #[actix_web::test]
    async fn delete_by_author_only() {
        let state = test_state();
        let author = state.content.register_user("Test_author").await.unwrap();
        let other = state.content.register_user("another_user").await.unwrap();
        let post = state.content.create_post(author.id, input("post")).await.unwrap();
        let app = test_app!(state);
        let uri = format!("/posts/{}/delete/", post.id);

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri(&uri).insert_header(auth_header(&other)).to_request(),
        )
        .await;
        assert_eq!(location(&resp), format!("/posts/{}/", post.id));
        assert!(state.content.get_post(post.id).await.is_ok());

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri(&uri).insert_header(auth_header(&author)).to_request(),
        )
        .await;
        assert_eq!(location(&resp), "/profile/Test_author/");
        assert!(state.content.get_post(post.id).await.is_err());
    }

    #[actix_web::test]
    async fn index_is_cached_until_cleared() {
        let state = test_state();
        let author = state.content.register_user("Test_author").await.unwrap();
        let post = state.content.create_post(author.id, input("cached")).await.unwrap();
        let app = test_app!(state);

        let first = test::call_and_read_body(&app, test::TestRequest::get().uri("/").to_request()).await;
        state.content.delete_post(post.id, author.id).await.unwrap();
        let second = test::call_and_read_body(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(first, second);

        state.content.clear_index_cache();
        let third = test::call_and_read_body(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_ne!(first, third);
    }

    #[actix_web::test]
    async fn uploaded_image_is_served() {
        let state = test_state();
        let author = state.content.register_user("Test_author").await.unwrap();
        let app = test_app!(state);
        let image = "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/create/")
                .insert_header(auth_header(&author))
                .set_form([("text", "with image"), ("image", image)])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);

        let post = state.content.index_page(1).await.unwrap().items.remove(0);
        let stored = post.image.unwrap();
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri(&format!("/media/{}", stored)).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "image/gif");

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/media/posts/missing.gif").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
