use crate::models::{
    GeoData, GeoDataPayload, GeoPoint, MountainPassSubmission, MountainPassView, Person,
    PersonPayload, PhotoMeta, Status, TitlePrefix,
};
use crate::workflow::Outcome;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::submit_data,
        crate::routes::edit_data_by_id,
        crate::routes::get_data_by_id,
        crate::routes::get_data_by_email,
    ),
    components(schemas(
        MountainPassSubmission,
        MountainPassView,
        Person,
        PersonPayload,
        GeoData,
        GeoDataPayload,
        GeoPoint,
        PhotoMeta,
        TitlePrefix,
        Status,
        Outcome,
    )),
    tags(
        (name = "MountainPass", description = "Mountain pass submission and lookup")
    )
)]
pub struct ApiDoc;
