use relaynet::EndpointConfig;

fn main() {
    let config = serdeconv::to_toml_string(&EndpointConfig::default()).expect("failed to generate config file");
    println!("{}", config);
}
