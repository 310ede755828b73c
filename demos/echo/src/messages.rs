relaynet::define_message! {
    ChatMessage, id = 30, name = "ChatMessage" => {
        text: relaynet::codec::VarString,
    }
}
