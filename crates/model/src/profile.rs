use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::{HasId, Id};

use crate::ExampleData;

/// Driver profile as kept by the identity backend.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Id<Profile>,
    pub name: String,
    pub email: String,
    /// digits only
    pub cpf: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub vehicle_plate: Option<String>,
    #[serde(flatten)]
    pub address: Address,
}

impl HasId for Profile {
    type IdType = String;
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub postal_code: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// Fields a driver may change after registration. Unset fields are kept.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub vehicle_plate: Option<String>,
    pub postal_code: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl Profile {
    pub fn apply(&mut self, update: ProfileUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        self.phone = update.phone.or(self.phone.take());
        self.avatar = update.avatar.or(self.avatar.take());
        self.vehicle_plate = update.vehicle_plate.or(self.vehicle_plate.take());

        let address = &mut self.address;
        address.postal_code = update.postal_code.or(address.postal_code.take());
        address.street = update.street.or(address.street.take());
        address.number = update.number.or(address.number.take());
        address.complement = update.complement.or(address.complement.take());
        address.neighborhood = update.neighborhood.or(address.neighborhood.take());
        address.city = update.city.or(address.city.take());
        address.state = update.state.or(address.state.take());
    }
}

impl ExampleData for Profile {
    fn example_data() -> Self {
        Profile {
            id: Id::new("driver-1".to_owned()),
            name: "Maria Souza".to_owned(),
            email: "maria@example.com".to_owned(),
            cpf: "52998224725".to_owned(),
            phone: Some("(11) 91234-5678".to_owned()),
            avatar: None,
            vehicle_plate: Some("ABC1D23".to_owned()),
            address: Address {
                city: Some("São Paulo".to_owned()),
                state: Some("SP".to_owned()),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_keeps_unset_fields() {
        let mut profile = Profile::example_data();
        profile.apply(ProfileUpdate {
            phone: Some("(11) 99999-0000".to_owned()),
            city: Some("Santos".to_owned()),
            ..Default::default()
        });
        assert_eq!(profile.name, "Maria Souza");
        assert_eq!(profile.phone.as_deref(), Some("(11) 99999-0000"));
        assert_eq!(profile.address.city.as_deref(), Some("Santos"));
        assert_eq!(profile.address.state.as_deref(), Some("SP"));
        assert_eq!(profile.vehicle_plate.as_deref(), Some("ABC1D23"));
    }
}
