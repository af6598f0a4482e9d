//! Romanian and Russian user-facing messages.

use crate::domain::value_objects::Language;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message {
    FieldRequired(&'static str),
    TermsNotAccepted,
    CartEmpty,
    SignInRequired,
    OrderPlaced,
    OrderNotSaved,
    PaymentRedirect,
    PaymentSucceeded,
    PaymentFailed,
    PaymentMissingParameters,
    PaymentStatusUnknown,
    AdminRequired,
    DeleteNotConfirmed,
    DuplicateSku,
}

/// Display name of a checkout form field.
fn field_label(field: &str, lang: Language) -> &'static str {
    match (field, lang) {
        ("firstName", Language::Ro) => "Prenume",
        ("firstName", Language::Ru) => "Имя",
        ("lastName", Language::Ro) => "Nume",
        ("lastName", Language::Ru) => "Фамилия",
        ("email", _) => "Email",
        ("phone", Language::Ro) => "Telefon",
        ("phone", Language::Ru) => "Телефон",
        ("address", Language::Ro) => "Adresa",
        ("address", Language::Ru) => "Адрес",
        ("city", Language::Ro) => "Oraș",
        ("city", Language::Ru) => "Город",
        ("postalCode", Language::Ro) => "Cod poștal",
        ("postalCode", Language::Ru) => "Почтовый индекс",
        _ => "",
    }
}

impl Message {
    pub fn text(self, lang: Language) -> String {
        use Language::{Ro, Ru};
        let s = match (self, lang) {
            (Self::FieldRequired(field), Ro) => return format!("Câmpul {} este obligatoriu", field_label(field, lang)),
            (Self::FieldRequired(field), Ru) => return format!("Поле «{}» обязательно", field_label(field, lang)),
            (Self::TermsNotAccepted, Ro) => "Trebuie să accepți termenii și condițiile",
            (Self::TermsNotAccepted, Ru) => "Необходимо принять условия и положения",
            (Self::CartEmpty, Ro) => "Coșul este gol",
            (Self::CartEmpty, Ru) => "Корзина пуста",
            (Self::SignInRequired, Ro) => "Trebuie să te conectezi pentru a face o comandă.",
            (Self::SignInRequired, Ru) => "Войдите в аккаунт, чтобы оформить заказ.",
            (Self::OrderPlaced, Ro) => "Comanda a fost plasată cu succes!",
            (Self::OrderPlaced, Ru) => "Заказ успешно оформлен!",
            (Self::OrderNotSaved, Ro) => "A apărut o eroare la salvarea comenzii",
            (Self::OrderNotSaved, Ru) => "Ошибка при сохранении заказа",
            (Self::PaymentRedirect, Ro) => "Vei fi redirecționat către pagina de plată",
            (Self::PaymentRedirect, Ru) => "Вы будете перенаправлены на страницу оплаты",
            (Self::PaymentSucceeded, Ro) => "Plata a fost efectuată cu succes",
            (Self::PaymentSucceeded, Ru) => "Оплата прошла успешно",
            (Self::PaymentFailed, Ro) => "Plata a eșuat",
            (Self::PaymentFailed, Ru) => "Оплата не прошла",
            (Self::PaymentMissingParameters, Ro) => "Parametri lipsă în răspunsul de plată",
            (Self::PaymentMissingParameters, Ru) => "В ответе платежа отсутствуют параметры",
            (Self::PaymentStatusUnknown, Ro) => "Nu s-a putut verifica statusul plății. Te rugăm să contactezi suportul.",
            (Self::PaymentStatusUnknown, Ru) => "Не удалось проверить статус оплаты. Свяжитесь со службой поддержки.",
            (Self::AdminRequired, Ro) => "Acces permis doar administratorilor",
            (Self::AdminRequired, Ru) => "Доступ только для администраторов",
            (Self::DeleteNotConfirmed, Ro) => "Confirmă ștergerea produsului",
            (Self::DeleteNotConfirmed, Ru) => "Подтвердите удаление товара",
            (Self::DuplicateSku, Ro) => "Există deja un produs cu acest SKU",
            (Self::DuplicateSku, Ru) => "Товар с таким SKU уже существует",
        };
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_messages_name_the_field() {
        assert_eq!(Message::FieldRequired("city").text(Language::Ro), "Câmpul Oraș este obligatoriu");
        assert!(Message::FieldRequired("city").text(Language::Ru).contains("Город"));
    }
}
