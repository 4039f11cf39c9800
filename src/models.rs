use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub enabled: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = assuntos)]
pub struct Assunto {
    pub id: i32,
    pub name: String,
    pub creator_id: i32,
    pub editor_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = assuntos)]
pub struct NewAssunto {
    pub name: String,
    pub creator_id: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = capas)]
pub struct Capa {
    pub id: i32,
    pub num_protocolo: String,
    pub distribuicao: NaiveDate,
    pub requerente: String,
    pub assunto: String,
    pub volume: String,
    pub observacao: String,
    pub creator_id: i32,
    pub editor_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = capas)]
pub struct NewCapa {
    pub num_protocolo: String,
    pub distribuicao: NaiveDate,
    pub requerente: String,
    pub assunto: String,
    pub volume: String,
    pub observacao: String,
    pub creator_id: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = protocolos)]
pub struct Protocolo {
    pub id: i32,
    pub num_inscricao: String,
    pub num_processo: i32,
    pub processo: String,
    pub assunto: String,
    pub anos_analise: String,
    pub nome: String,
    pub cpf: String,
    pub cnpj: String,
    pub telefone: String,
    pub enviar_whatsapp: bool,
    pub whatsapp_enviado: bool,
    pub creator_id: i32,
    pub editor_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = protocolos)]
pub struct NewProtocolo {
    pub num_inscricao: String,
    pub num_processo: i32,
    pub processo: String,
    pub assunto: String,
    pub anos_analise: String,
    pub nome: String,
    pub cpf: String,
    pub cnpj: String,
    pub telefone: String,
    pub enviar_whatsapp: bool,
    pub creator_id: i32,
}
