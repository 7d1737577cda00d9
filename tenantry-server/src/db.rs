use crate::{
    models::{membership::MembershipDoc, org::OrganizationDoc, user::UserDoc},
    response::ServerResult,
};
use mongodb::{Client, Collection, IndexModel, options::ClientOptions};
use mongodb::{bson::doc, options::IndexOptions};
use tenantry_shared::members::MemberStatus;

#[derive(Clone)]
pub struct Mongo {
    pub client: Client,
    pub db_name: String,
}

impl Mongo {
    pub async fn connect(url: &str, db_name: &str) -> ServerResult<Self> {
        let mut opts = ClientOptions::parse(url).await?;
        opts.app_name = Some("tenantry".into());
        let client = Client::with_options(opts)?;
        Ok(Self {
            client,
            db_name: db_name.into(),
        })
    }

    fn col<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.client.database(&self.db_name).collection(name)
    }

    pub fn users(&self) -> Collection<UserDoc> {
        self.col("users")
    }

    pub fn organizations(&self) -> Collection<OrganizationDoc> {
        self.col("organizations")
    }

    pub fn organization_members(&self) -> Collection<MembershipDoc> {
        self.col("organization_members")
    }

    pub async fn ensure_indexes(&self) -> ServerResult<()> {
        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "sub": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;

        self.users()
            .create_index(IndexModel::builder().keys(doc! { "email": 1 }).build())
            .await?;

        self.organizations()
            .create_index(IndexModel::builder().keys(doc! { "owner_id": 1 }).build())
            .await?;

        // one open (pending or active) membership per organization and email
        self.organization_members()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "organization_id": 1, "email": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .partial_filter_expression(doc! {
                                "status": {
                                    "$in": [
                                        MemberStatus::Pending.as_str(),
                                        MemberStatus::Active.as_str(),
                                    ]
                                }
                            })
                            .name("open_membership_per_email".to_string())
                            .build(),
                    )
                    .build(),
            )
            .await?;

        self.organization_members()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "status": 1 })
                    .build(),
            )
            .await?;

        self.organization_members()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "invitation_token": 1 })
                    .options(IndexOptions::builder().sparse(true).build())
                    .build(),
            )
            .await?;

        Ok(())
    }
}
