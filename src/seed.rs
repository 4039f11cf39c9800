//! Bootstrap data for a fresh database: the first SUPERADMIN account and the
//! standard assunto catalogue.

use anyhow::{Context, Result};
use diesel::pg::PgConnection;
use diesel::prelude::*;

use crate::{
    auth::{password, Role},
    models::{NewAssunto, NewUser},
    routes::users::normalize_email,
    schema::{assuntos, users},
    utils::text::normalize,
};

pub const DEFAULT_ASSUNTOS: &[&str] = &[
    "PAGAMENTO",
    "ALTERAÇÃO DE NOME",
    "PRESCRIÇÃO DE DÉBITO",
    "RENOVAÇÃO DE ISENÇÃO DE IPTU",
    "BAIXA DE DÉBITO",
    "SOLICITAÇÃO DE PROVIDÊNCIAS",
    "AUTO DE NOTIFICAÇÃO",
    "ISENÇÃO DE IPTU",
    "PAGAMENTO DE ALUGUEL",
    "RENOVAÇÃO DE INSPEÇÃO SANITÁRIA",
    "PAGAMENTO LIGHT",
    "PAGAMENTO NET",
    "PAGAMENTO ÁGUAS DO RIO",
    "LICENÇA PRÊMIO",
    "CADASTRO DE IPTU",
    "PARCELAMENTO COM VALORES BLOQUEADOS",
    "ATUALIZAÇÃO CADASTRAL",
    "BAIXA DE ALVARÁ",
    "NADA A OPOR",
    "LEGALIZAÇÃO DE PUBLICIDADE",
    "ENQUADRAMENTO POR FORMAÇÃO",
    "BAIXA DE TAXA INDEVIDA",
];

pub struct SeedAdmin<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, PartialEq, Eq)]
pub struct SeedReport {
    pub admin_id: i32,
    pub admin_created: bool,
    pub assuntos_created: usize,
}

/// Idempotent: an existing admin is left untouched and only missing active
/// assuntos are inserted.
pub fn seed_database(conn: &mut PgConnection, admin: &SeedAdmin<'_>) -> Result<SeedReport> {
    let email = normalize_email(admin.email);
    let password_hash = password::hash_password(admin.password)?;

    conn.transaction(|conn| {
        let existing: Option<i32> = users::table
            .filter(users::email.eq(&email))
            .select(users::id)
            .first(conn)
            .optional()?;

        let (admin_id, admin_created) = match existing {
            Some(id) => (id, false),
            None => {
                let id = diesel::insert_into(users::table)
                    .values(&NewUser {
                        name: admin.name.trim().to_string(),
                        email: email.clone(),
                        password_hash,
                        role: Role::SuperAdmin.as_str().to_string(),
                    })
                    .returning(users::id)
                    .get_result(conn)?;
                (id, true)
            }
        };

        let mut names: Vec<String> = DEFAULT_ASSUNTOS.iter().map(|name| normalize(name)).collect();
        names.sort();

        let mut assuntos_created = 0;
        for name in names {
            let present: Option<i32> = assuntos::table
                .filter(assuntos::name.eq(&name))
                .filter(assuntos::deleted_at.is_null())
                .select(assuntos::id)
                .first(conn)
                .optional()?;
            if present.is_some() {
                continue;
            }

            diesel::insert_into(assuntos::table)
                .values(&NewAssunto {
                    name,
                    creator_id: admin_id,
                })
                .execute(conn)?;
            assuntos_created += 1;
        }

        Ok::<_, diesel::result::Error>(SeedReport {
            admin_id,
            admin_created,
            assuntos_created,
        })
    })
    .context("failed to seed database")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::DEFAULT_ASSUNTOS;
    use crate::utils::text::normalize;

    #[test]
    fn catalogue_is_normalized_and_unique() {
        let unique: HashSet<_> = DEFAULT_ASSUNTOS.iter().collect();
        assert_eq!(unique.len(), DEFAULT_ASSUNTOS.len());
        for name in DEFAULT_ASSUNTOS {
            assert_eq!(&normalize(name), name);
        }
    }
}
