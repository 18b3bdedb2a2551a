mod response_parser;
