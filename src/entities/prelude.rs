pub use super::assets::Entity as Assets;
