//! Entity metadata: the [`entity!`](crate::entity!) macro and the schema
//! resolved from it.

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::{FieldType, Value};

/// Static declaration of one scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Field (and column) name.
    pub name: &'static str,
    /// Semantic type of the field.
    pub ty: FieldType,
}

/// Declares an entity with automatic [`Entity`] trait implementation.
///
/// Scalar fields are listed in the struct body. Navigation collections are
/// declared in an optional trailing `navigation` block; they are never
/// persisted and only populated by relationship hydration.
///
/// # Examples
///
/// ```ignore
/// entity! {
///     #[derive(Debug, Clone, Default, PartialEq)]
///     pub struct Person {
///         pub person_id: i32,
///         pub firstname: String,
///     }
///     navigation {
///         pub identifications: Vec<Identification>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! entity {
    (
        $(#[$meta:meta])*
        pub struct $struct_name:ident {
            $(
                $(#[$field_meta:meta])*
                pub $field_name:ident : $field_type:ty
            ),* $(,)?
        }
        $(
            navigation {
                $(
                    $(#[$nav_meta:meta])*
                    pub $nav_name:ident : Vec<$nav_type:ty>
                ),* $(,)?
            }
        )?
    ) => {
        #[allow(missing_docs)]
        $(#[$meta])*
        pub struct $struct_name {
            $(
                $(#[$field_meta])*
                pub $field_name : $field_type,
            )*
            $($(
                $(#[$nav_meta])*
                pub $nav_name : Vec<$nav_type>,
            )*)?
        }

        impl $crate::Entity for $struct_name {
            const NAME: &'static str = stringify!($struct_name);

            fn fields() -> &'static [$crate::FieldDef] {
                const FIELDS: &[$crate::FieldDef] = &[
                    $(
                        $crate::FieldDef {
                            name: stringify!($field_name),
                            ty: <$field_type as $crate::FieldValue>::TYPE,
                        },
                    )*
                ];
                FIELDS
            }

            fn navigations() -> &'static [&'static str] {
                &[ $($( stringify!($nav_name) ),*)? ]
            }

            fn get(&self, field: &str) -> Option<$crate::Value> {
                match field {
                    $( stringify!($field_name) => Some($crate::FieldValue::to_value(&self.$field_name)), )*
                    _ => None,
                }
            }

            fn set(&mut self, field: &str, value: $crate::Value) -> $crate::Result<()> {
                match field {
                    $(
                        stringify!($field_name) => {
                            self.$field_name =
                                <$field_type as $crate::FieldValue>::from_value(field, value)?;
                            Ok(())
                        }
                    )*
                    _ => Err($crate::Error::UnknownField {
                        entity: <Self as $crate::Entity>::NAME,
                        field: field.to_string(),
                    }),
                }
            }
        }
    };
}

/// Trait for persistable record types.
///
/// Typically implemented via the `entity!` macro rather than manually.
pub trait Entity: Clone + Default + Debug + Send + Sync + 'static {
    /// Entity type name; also the default table name.
    const NAME: &'static str;

    /// Scalar fields in declaration order.
    fn fields() -> &'static [FieldDef];

    /// Navigation collection names. Never persisted.
    #[must_use]
    fn navigations() -> &'static [&'static str] {
        &[]
    }

    /// Read a scalar field by name.
    fn get(&self, field: &str) -> Option<Value>;

    /// Assign a scalar field by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is unknown or the value does not fit
    /// the field's type.
    fn set(&mut self, field: &str, value: Value) -> Result<()>;
}

/// Role a field plays in persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Identity field.
    Key(KeyKind),
    /// Ordinary persisted field.
    Scalar,
    /// Derived collection, materialized by hydration only.
    Navigation,
}

/// How a key value comes into being.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Assigned by the store on create.
    Generated,
    /// Supplied by the caller.
    Natural,
}

/// Resolved field descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: &'static str,
    /// Semantic type; `None` for navigation collections.
    pub ty: Option<FieldType>,
    /// Role of the field.
    pub role: FieldRole,
}

/// Field layout of an entity type, resolved once when an adapter is built.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    entity: &'static str,
    descriptors: Vec<FieldDescriptor>,
    key: &'static str,
    generated: bool,
}

impl EntitySchema {
    /// Resolve the schema using the key naming convention (`id` or
    /// `{entity}_id`, ignoring case and underscores) and derive the identity
    /// flag from the key's type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoKeyProperty`] if no field matches the convention.
    pub fn resolve<T: Entity>() -> Result<Self> {
        let by_type = format!("{}id", normalize(T::NAME));
        let key = T::fields()
            .iter()
            .find(|def| {
                let name = normalize(def.name);
                name == "id" || name == by_type
            })
            .ok_or(Error::NoKeyProperty { entity: T::NAME })?;

        Self::with_key::<T>(key.name, None)
    }

    /// Resolve the schema with an explicit key. When `generated` is `None`
    /// the identity flag is derived from the key's type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKeyProperty`] if `key` is not a scalar field.
    pub fn with_key<T: Entity>(key: &str, generated: Option<bool>) -> Result<Self> {
        let key_def = T::fields().iter().find(|def| def.name == key).ok_or_else(|| {
            Error::InvalidKeyProperty { entity: T::NAME, field: key.to_string() }
        })?;

        let generated = generated.unwrap_or_else(|| key_def.ty.scalar.is_integer_like());
        let key_kind = if generated { KeyKind::Generated } else { KeyKind::Natural };

        let mut descriptors: Vec<FieldDescriptor> = T::fields()
            .iter()
            .map(|def| FieldDescriptor {
                name: def.name,
                ty: Some(def.ty),
                role: if def.name == key_def.name {
                    FieldRole::Key(key_kind)
                } else {
                    FieldRole::Scalar
                },
            })
            .collect();
        descriptors.extend(T::navigations().iter().map(|&name| FieldDescriptor {
            name,
            ty: None,
            role: FieldRole::Navigation,
        }));

        tracing::debug!(
            entity = T::NAME,
            key = key_def.name,
            generated,
            field_count = descriptors.len(),
            "resolved entity schema"
        );

        Ok(Self { entity: T::NAME, descriptors, key: key_def.name, generated })
    }

    /// Entity name.
    #[must_use]
    pub const fn entity(&self) -> &'static str {
        self.entity
    }

    /// All descriptors, navigation collections included.
    #[must_use]
    pub fn descriptors(&self) -> &[FieldDescriptor] {
        &self.descriptors
    }

    /// Key field name.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.key
    }

    /// Whether the key is assigned by the store.
    #[must_use]
    pub const fn is_generated(&self) -> bool {
        self.generated
    }

    /// Persisted fields (key included), in declaration order.
    pub fn persisted(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors
            .iter()
            .filter(|d| !matches!(d.role, FieldRole::Navigation))
            .map(|d| d.name)
    }

    /// Persisted fields without the key.
    pub fn persisted_without_key(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.iter().filter(|d| matches!(d.role, FieldRole::Scalar)).map(|d| d.name)
    }

    /// Fields written on insert: the key is skipped when generated.
    pub fn insertable(&self) -> impl Iterator<Item = &'static str> + '_ {
        let generated = self.generated;
        self.descriptors
            .iter()
            .filter(move |d| match d.role {
                FieldRole::Key(_) => !generated,
                FieldRole::Scalar => true,
                FieldRole::Navigation => false,
            })
            .map(|d| d.name)
    }

    /// Read the key value of an entity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownField`] if the entity does not expose the key.
    pub fn key_value<T: Entity>(&self, entity: &T) -> Result<Value> {
        read_field(entity, self.key)
    }

    /// Whether the entity still carries the unassigned key of a generated
    /// identity (null or zero).
    #[must_use]
    pub fn is_transient<T: Entity>(&self, entity: &T) -> bool {
        self.generated && matches!(entity.get(self.key), None | Some(Value::Null | Value::Int(0)))
    }

    /// Copy persisted fields into a fresh entity, leaving navigations empty.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be read or assigned.
    pub fn snapshot<T: Entity>(&self, entity: &T) -> Result<T> {
        let mut copy = T::default();
        for field in self.persisted() {
            copy.set(field, read_field(entity, field)?)?;
        }
        Ok(copy)
    }
}

/// Read a field, failing on unknown names.
///
/// # Errors
///
/// Returns [`Error::UnknownField`] if the entity has no such field.
pub fn read_field<T: Entity>(entity: &T, field: &str) -> Result<Value> {
    entity
        .get(field)
        .ok_or_else(|| Error::UnknownField { entity: T::NAME, field: field.to_string() })
}

fn normalize(name: &str) -> String {
    name.chars().filter(|c| *c != '_').flat_map(char::to_lowercase).collect()
}

/// A captured value whose members can be read by name, used for
/// closure-capture flattening in predicates.
pub trait Record: Debug + Send + Sync {
    /// Type name for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Read a member by name.
    fn member(&self, name: &str) -> Option<Value>;
}

impl<T: Entity> Record for T {
    fn type_name(&self) -> &'static str {
        T::NAME
    }

    fn member(&self, name: &str) -> Option<Value> {
        self.get(name)
    }
}

/// Shared handle to a captured record.
pub type Captured = Arc<dyn Record>;
