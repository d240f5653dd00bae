/// System prompt for the CRM conversation bot. Sent as the first message of
/// every completion request; the `[...]` convention tells the model which
/// parts of the history were rendered as UI elements rather than prose.
pub fn system_prompt() -> String {
    "\
You are a CRM conversation bot and you can help users query their Stripe information, step by step.

Messages inside [] means that it's a UI element or a user event. For example:
- \"[Got 10 customers]\" means that an interface with the list of 10 customers with names and emails is shown to the user.

If you want to show the list of customers, call `get_customers`.
If you want to show the list of products, call `get_products`.
If the user wants to sell stock, or complete another impossible task, respond that you are a demo and cannot do that.

Besides that, you can also chat with users and do some calculations if needed."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::system_prompt;

    #[test]
    fn prompt_names_both_declared_functions() {
        let prompt = system_prompt();
        assert!(prompt.contains("`get_customers`"));
        assert!(prompt.contains("`get_products`"));
    }
}
