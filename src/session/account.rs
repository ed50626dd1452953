use tracing::info;

use super::ListError;
use crate::network::CatalogClient;
use crate::network::models::{NewTranslator, Translator};
use crate::storage::{Role, UserPreferencesRepository};

/// 远端创建译者档案成功后，本地角色切换为 translator。不会自动回退。
pub async fn become_translator(
    client: &CatalogClient,
    prefs: &UserPreferencesRepository,
    data: &NewTranslator,
) -> Result<Translator, ListError> {
    let translator = client.create_translator(data).await?;
    prefs.set_role(Role::Translator).await?;
    info!(
        target: "reader",
        user_id = %translator.user_id,
        "role switched to translator"
    );
    Ok(translator)
}
